//! Single-flight coordination of refresh-token exchanges.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("refresh rejected: {0}")]
    Rejected(String),

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("could not store refreshed tokens: {0}")]
    Store(String),
}

/// New access token on success.
pub type RefreshOutcome = Result<String, RefreshFailure>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

enum RefreshState {
    Idle,
    Refreshing(SharedRefresh),
}

/// At most one refresh exchange is in flight. Callers arriving while one is
/// running attach to it and observe the same outcome.
#[derive(Clone)]
pub struct RefreshCoordinator {
    state: Arc<Mutex<RefreshState>>,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RefreshState::Idle)),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(
            self.state.lock().as_deref(),
            Ok(RefreshState::Refreshing(_))
        )
    }

    /// Join the in-flight exchange, or start one with `start` when idle.
    pub async fn run<F, Fut>(&self, start: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let shared = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            match &*state {
                RefreshState::Refreshing(in_flight) => {
                    tracing::debug!("Joining in-flight token refresh");
                    in_flight.clone()
                }
                RefreshState::Idle => {
                    let slot = Arc::clone(&self.state);
                    let exchange = start();
                    let shared = async move {
                        let outcome = exchange.await;
                        // Back to idle before any waiter observes the outcome
                        if let Ok(mut state) = slot.lock() {
                            *state = RefreshState::Idle;
                        }
                        outcome
                    }
                    .boxed()
                    .shared();
                    *state = RefreshState::Refreshing(shared.clone());
                    shared
                }
            }
        };

        shared.await
    }
}
