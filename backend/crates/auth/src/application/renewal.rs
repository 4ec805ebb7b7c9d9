//! Session Renewal
//!
//! Client-side task that refreshes the access token on a fixed interval,
//! shorter than the token lifetime. One task per session. It stops when
//! cancelled (logout, teardown) and terminates the session on the first
//! failed refresh.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::refresh::RefreshUseCase;
use crate::domain::repository::AuthStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenewalError {
    /// Server refused the refresh token (HTTP status)
    #[error("refresh rejected with status {0}")]
    Rejected(u16),

    #[error("refresh transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// A refresh failed; the user must log in again
    Terminated,
    /// Cancelled by the owner
    Stopped,
}

/// Something that can renew the access token of one session
#[trait_variant::make(TokenRefresher: Send)]
pub trait LocalTokenRefresher {
    async fn refresh(&self) -> Result<(), RenewalError>;
}

impl<F, Fut> TokenRefresher for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RenewalError>> + Send,
{
    async fn refresh(&self) -> Result<(), RenewalError> {
        self().await
    }
}

/// Renews through the refresh use case in-process, holding the session's
/// refresh token
pub struct InProcessRefresher<R: AuthStore> {
    use_case: RefreshUseCase<R>,
    refresh_token: String,
}

impl<R: AuthStore> InProcessRefresher<R> {
    pub fn new(use_case: RefreshUseCase<R>, refresh_token: impl Into<String>) -> Self {
        Self {
            use_case,
            refresh_token: refresh_token.into(),
        }
    }
}

impl<R: AuthStore> TokenRefresher for InProcessRefresher<R> {
    async fn refresh(&self) -> Result<(), RenewalError> {
        self.use_case
            .execute(Some(&self.refresh_token))
            .await
            .map(|_| ())
            .map_err(|e| RenewalError::Rejected(e.kind().status_code()))
    }
}

pub struct SessionRenewal {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    handle: Option<JoinHandle<()>>,
}

impl SessionRenewal {
    /// Start renewing. The first refresh happens one `interval` from now.
    pub fn spawn<T>(refresher: T, interval: Duration) -> Self
    where
        T: TokenRefresher + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(SessionState::Active);
        let handle = tokio::spawn(run(refresher, interval, cancel.clone(), tx));

        Self {
            cancel,
            state: rx,
            handle: Some(handle),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the task to exit
    pub async fn shutdown(mut self) -> SessionState {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Renewal task panicked");
            }
        }
        self.state()
    }
}

impl Drop for SessionRenewal {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<T>(
    refresher: T,
    interval: Duration,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
) where
    T: TokenRefresher + Sync,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Session renewal cancelled");
                state.send_replace(SessionState::Stopped);
                return;
            }
            _ = ticker.tick() => {}
        }

        // A refresh in flight is abandoned on cancel
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                state.send_replace(SessionState::Stopped);
                return;
            }
            result = refresher.refresh() => result,
        };

        match result {
            Ok(()) => tracing::debug!("Access token renewed"),
            Err(e) => {
                tracing::warn!(error = %e, "Access token renewal failed, ending session");
                state.send_replace(SessionState::Terminated);
                return;
            }
        }
    }
}
