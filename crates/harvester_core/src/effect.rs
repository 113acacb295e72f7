use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalEffect {
    /// Run the refresh-then-login procedure.
    Renew { trigger: RenewalTrigger },
    /// An on-demand request arrived inside the cooldown window.
    Skipped { remaining: Duration },
    /// Re-arm the renewal timer to fire after `after`.
    ScheduleTimer { after: Duration },
    /// Stop serving: close the request channel and return.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalTrigger {
    Timer,
    Request,
}
