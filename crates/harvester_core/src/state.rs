use std::time::{Duration, Instant};

/// Tunables of the renewal state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct RenewalSettings {
    /// On-demand requests arriving this soon after the last attempt are skipped.
    pub cooldown: Duration,
    /// Share of the binding token lifetime after which the timer fires.
    pub lifetime_fraction: f64,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            lifetime_fraction: 0.95,
        }
    }
}

/// Lifetimes reported by the identity provider for one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetime {
    pub access: Duration,
    /// Zero means the refresh credential does not expire.
    pub refresh: Duration,
}

impl TokenLifetime {
    pub fn new(access: Duration, refresh: Duration) -> Self {
        Self { access, refresh }
    }

    /// The shorter of the two lifetimes; this is the one that forces renewal.
    pub fn binding(&self) -> Duration {
        if self.refresh.is_zero() {
            self.access
        } else {
            self.access.min(self.refresh)
        }
    }

    /// Delay until the next timer-driven renewal.
    pub fn renewal_delay(&self, fraction: f64) -> Duration {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.binding().mul_f64(fraction)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenewalState {
    settings: RenewalSettings,
    last_attempt: Instant,
    stopped: bool,
}

impl RenewalState {
    /// `started_at` is the moment of the initial login, which counts as an attempt.
    pub fn new(settings: RenewalSettings, started_at: Instant) -> Self {
        Self {
            settings,
            last_attempt: started_at,
            stopped: false,
        }
    }

    pub fn settings(&self) -> &RenewalSettings {
        &self.settings
    }

    pub fn last_attempt(&self) -> Instant {
        self.last_attempt
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Time left before an on-demand request is honoured, or `None` if it would be now.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last_attempt);
        self.settings
            .cooldown
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    pub(crate) fn record_attempt(&mut self, now: Instant) {
        self.last_attempt = now;
    }

    pub(crate) fn stop(&mut self) {
        self.stopped = true;
    }
}
