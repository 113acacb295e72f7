use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalMsg {
    /// The scheduled renewal timer fired.
    TimerExpired { now: Instant },
    /// A caller suspects the token is stale and asked for a renewal.
    RenewalRequested { now: Instant },
    /// Refresh or login produced a new token with these lifetimes.
    RenewalSucceeded { lifetime: crate::TokenLifetime },
    /// Both refresh and login exhausted their retry budgets.
    RenewalFailed,
    /// Shutdown was signalled.
    Cancelled,
}
