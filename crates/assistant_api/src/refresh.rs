use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::auth::TokenResponse;
use crate::error::ApiError;
use crate::transport::{ApiRequest, Transport};
use crate::url::REFRESH_PATH;
use crate::{Credential, CredentialStore};

type RefreshAttempt = Shared<BoxFuture<'static, Option<Credential>>>;

/// The pending attempt, stamped with the generation it was started in.
/// [`RefreshCoordinator::reset`] bumps the generation, orphaning the attempt.
#[derive(Default)]
struct Slot {
    generation: u64,
    attempt: Option<RefreshAttempt>,
}

/// Single-flight credential renewal.
///
/// Concurrent callers share one in-flight `/refresh` call and all observe its
/// outcome. Once that call settles the slot empties, so the next caller
/// starts a new attempt. An attempt orphaned by `reset` settles without
/// touching the store or the slot.
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    in_flight: Arc<Mutex<Slot>>,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<CredentialStore>) -> Self {
        Self {
            transport,
            store,
            in_flight: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Renew the credential. Failures are logged and reported as `None`;
    /// the store is only written on success.
    pub async fn refresh(&self) -> Option<Credential> {
        let attempt = {
            let mut slot = lock_unpoisoned(&self.in_flight);
            match slot.attempt.as_ref() {
                Some(attempt) => {
                    debug!("joining in-flight credential refresh");
                    attempt.clone()
                }
                None => {
                    let attempt = self.start_attempt(slot.generation);
                    slot.attempt = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        lock_unpoisoned(&self.in_flight).attempt.is_some()
    }

    /// Forget any pending attempt without waiting for it. Its outcome is
    /// discarded when it settles.
    pub fn reset(&self) {
        let mut slot = lock_unpoisoned(&self.in_flight);
        slot.generation = slot.generation.wrapping_add(1);
        slot.attempt = None;
    }

    fn start_attempt(&self, generation: u64) -> RefreshAttempt {
        let transport = Arc::clone(&self.transport);
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);

        async move {
            let outcome = request_credential(transport.as_ref()).await;

            // The store write and the slot check share one critical section
            // with `reset`.
            let mut slot = lock_unpoisoned(&in_flight);
            if slot.generation != generation {
                debug!("discarding refresh outcome after reset");
                return None;
            }
            slot.attempt = None;
            match outcome {
                Ok(credential) => {
                    store.set(credential.clone());
                    info!("credential refreshed");
                    Some(credential)
                }
                Err(error) => {
                    warn!(%error, "credential refresh failed");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

async fn request_credential(transport: &dyn Transport) -> Result<Credential, ApiError> {
    // Cookie-credentialed; a stale bearer header must not ride along.
    let response = transport.send(ApiRequest::post(REFRESH_PATH)).await?;
    if !response.is_success() {
        return Err(ApiError::from_response(response, "Failed to refresh session").await);
    }

    let token = response.json::<TokenResponse>().await?;
    token.credential()
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
