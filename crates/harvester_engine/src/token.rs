//! Token lifecycle actor.
//!
//! [`TokenManager::run`] is the only writer of the current [`Token`]. It waits
//! for whichever comes first of the renewal timer, an on-demand renewal
//! request, or cancellation, feeds the event through the pure renewal state
//! machine, and executes the resulting effects. Readers hold a [`TokenHandle`]
//! and only ever see whole snapshots published through a `watch` channel.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use harvester_core::{
    update, RenewalEffect, RenewalMsg, RenewalSettings, RenewalState, RenewalTrigger,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthProvider;
use crate::retry::{retry_with_policy, RetryAction, RetryError, RetryPolicy};
use crate::{AuthError, Token};

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub renewal: RenewalSettings,
    pub refresh_retry: RetryPolicy,
    pub login_retry: RetryPolicy,
    /// Pending renewal requests kept before further ones coalesce.
    pub request_buffer: usize,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            renewal: RenewalSettings::default(),
            refresh_retry: RetryPolicy::auth(),
            login_retry: RetryPolicy::auth(),
            request_buffer: 1,
        }
    }
}

/// Cheap, cloneable read side of the token manager.
#[derive(Debug, Clone)]
pub struct TokenHandle {
    token_rx: watch::Receiver<Arc<Token>>,
    renew_tx: mpsc::Sender<()>,
}

impl TokenHandle {
    /// Latest token snapshot; never blocks on the manager.
    pub fn current_token(&self) -> Arc<Token> {
        self.token_rx.borrow().clone()
    }

    /// Ask for a renewal. Returns `false` once the manager has stopped.
    ///
    /// A full request buffer means a renewal is already pending, so the
    /// request is folded into it.
    pub fn request_renewal(&self) -> bool {
        match self.renew_tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                engine_debug!("Renewal already pending, request coalesced");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    /// Resolves after the next token replacement, or when the manager is gone.
    pub async fn changed(&mut self) -> bool {
        self.token_rx.changed().await.is_ok()
    }
}

pub struct TokenManager<P> {
    provider: P,
    settings: TokenSettings,
    state: RenewalState,
    token_tx: watch::Sender<Arc<Token>>,
    renew_rx: mpsc::Receiver<()>,
}

impl<P: AuthProvider> TokenManager<P> {
    /// Log in with the login retry budget and build the manager with its handle.
    ///
    /// Failure here is fatal to the caller: there is no token to serve.
    pub async fn start(
        provider: P,
        settings: TokenSettings,
        cancel: &CancellationToken,
    ) -> Result<(Self, TokenHandle), AuthError> {
        let token = retry_with_policy(
            &settings.login_retry,
            cancel,
            "login",
            classify_auth,
            |_| provider.login(),
        )
        .await
        .map_err(into_auth_error)?;
        engine_info!(
            "Logged in, token valid for {:?} (refresh {:?})",
            token.expires_in,
            token.refresh_expires_in
        );

        let (token_tx, token_rx) = watch::channel(Arc::new(token));
        let (renew_tx, renew_rx) = mpsc::channel(settings.request_buffer.max(1));
        let state = RenewalState::new(settings.renewal.clone(), Instant::now().into_std());

        let manager = Self {
            provider,
            settings,
            state,
            token_tx,
            renew_rx,
        };
        let handle = TokenHandle { token_rx, renew_tx };
        Ok((manager, handle))
    }

    /// Serve until `cancel` fires. Closes the request channel on the way out.
    pub async fn run(mut self, cancel: CancellationToken) {
        let first = self
            .token_tx
            .borrow()
            .lifetime()
            .renewal_delay(self.state.settings().lifetime_fraction);
        engine_info!("Token renewal scheduled in {:?}", first);

        let timer = tokio::time::sleep(first);
        tokio::pin!(timer);
        let mut timer_armed = true;
        let mut requests_open = true;

        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => RenewalMsg::Cancelled,
                _ = &mut timer, if timer_armed => {
                    timer_armed = false;
                    RenewalMsg::TimerExpired { now: Instant::now().into_std() }
                }
                request = self.renew_rx.recv(), if requests_open => match request {
                    Some(()) => RenewalMsg::RenewalRequested { now: Instant::now().into_std() },
                    None => {
                        requests_open = false;
                        continue;
                    }
                },
            };

            if !self.dispatch(msg, timer.as_mut(), &mut timer_armed, &cancel).await {
                break;
            }
        }
    }

    /// Apply one event and every follow-up it produces. Returns `false` on stop.
    async fn dispatch(
        &mut self,
        msg: RenewalMsg,
        mut timer: Pin<&mut Sleep>,
        timer_armed: &mut bool,
        cancel: &CancellationToken,
    ) -> bool {
        let mut pending = VecDeque::from([msg]);
        while let Some(msg) = pending.pop_front() {
            let (state, effects) = update(self.state.clone(), msg);
            self.state = state;

            for effect in effects {
                match effect {
                    RenewalEffect::Renew { trigger } => {
                        let follow_up = match self.renew(trigger, cancel).await {
                            Ok(token) => {
                                let lifetime = token.lifetime();
                                self.token_tx.send_replace(Arc::new(token));
                                engine_info!("Token renewal success");
                                RenewalMsg::RenewalSucceeded { lifetime }
                            }
                            Err(AuthError::Cancelled) => RenewalMsg::Cancelled,
                            Err(_) => RenewalMsg::RenewalFailed,
                        };
                        pending.push_back(follow_up);
                    }
                    RenewalEffect::Skipped { remaining } => {
                        engine_info!(
                            "Renew token on demand skipped (next on-demand renewal in {:?})",
                            remaining
                        );
                    }
                    RenewalEffect::ScheduleTimer { after } => {
                        timer.as_mut().reset(Instant::now() + after);
                        *timer_armed = true;
                        engine_debug!("Next token renewal in {:?}", after);
                    }
                    RenewalEffect::Stop => {
                        self.close_requests();
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Refresh with the stored refresh credential, falling back to a full login.
    async fn renew(
        &self,
        trigger: RenewalTrigger,
        cancel: &CancellationToken,
    ) -> Result<Token, AuthError> {
        engine_debug!("Renewing token ({:?})", trigger);
        let refresh_token = self.token_tx.borrow().refresh_token.clone();
        let provider = &self.provider;

        let refreshed = retry_with_policy(
            &self.settings.refresh_retry,
            cancel,
            "token refresh",
            classify_auth,
            |_| provider.refresh(&refresh_token),
        )
        .await;
        let err = match refreshed {
            Ok(token) => return Ok(token),
            Err(RetryError::Cancelled) => return Err(AuthError::Cancelled),
            Err(err) => err,
        };
        engine_warn!("Cannot renew the token: {}; trying to create a new one", err);

        retry_with_policy(
            &self.settings.login_retry,
            cancel,
            "login",
            classify_auth,
            |_| provider.login(),
        )
        .await
        .map_err(|err| {
            if !matches!(err, RetryError::Cancelled) {
                engine_error!("Token renewal impossible: {}", err);
            }
            into_auth_error(err)
        })
    }

    fn close_requests(&mut self) {
        engine_info!("Token manager received cancellation signal, closing renewal requests");
        self.renew_rx.close();
        let mut dropped = 0usize;
        while self.renew_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            engine_debug!("Discarded {} pending renewal requests", dropped);
        }
    }
}

fn classify_auth(err: &AuthError) -> RetryAction {
    match err {
        AuthError::Cancelled => RetryAction::Abort,
        // A rejected grant will not succeed on the next try; escalate instead.
        AuthError::Rejected { status, .. } if (400..500).contains(status) => RetryAction::Abort,
        _ => RetryAction::Retry,
    }
}

fn into_auth_error(err: RetryError<AuthError>) -> AuthError {
    match err {
        RetryError::Exhausted { last, .. } | RetryError::Aborted(last) => last,
        RetryError::Cancelled => AuthError::Cancelled,
    }
}
