use crate::{RenewalEffect, RenewalMsg, RenewalState, RenewalTrigger};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: RenewalState, msg: RenewalMsg) -> (RenewalState, Vec<RenewalEffect>) {
    if state.is_stopped() {
        return (state, Vec::new());
    }

    let effects = match msg {
        RenewalMsg::TimerExpired { now } => {
            state.record_attempt(now);
            vec![RenewalEffect::Renew {
                trigger: RenewalTrigger::Timer,
            }]
        }
        RenewalMsg::RenewalRequested { now } => match state.cooldown_remaining(now) {
            Some(remaining) => vec![RenewalEffect::Skipped { remaining }],
            None => {
                state.record_attempt(now);
                vec![RenewalEffect::Renew {
                    trigger: RenewalTrigger::Request,
                }]
            }
        },
        RenewalMsg::RenewalSucceeded { lifetime } => {
            let after = lifetime.renewal_delay(state.settings().lifetime_fraction);
            vec![RenewalEffect::ScheduleTimer { after }]
        }
        // Keep the timer alive; the stale token is served until a later attempt succeeds.
        RenewalMsg::RenewalFailed => vec![RenewalEffect::ScheduleTimer {
            after: state.settings().cooldown,
        }],
        RenewalMsg::Cancelled => {
            state.stop();
            vec![RenewalEffect::Stop]
        }
    };

    (state, effects)
}
