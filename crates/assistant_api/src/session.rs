use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::CredentialStore;

/// Callback run once when the session cannot be renewed (e.g. route back to login).
pub type SessionEndHook = Arc<dyn Fn() + Send + Sync>;

/// One-shot latch guarding the "session ended" side effect.
///
/// However many requests fail authorization at once, only the first to reach
/// [`SessionTerminator::terminate`] clears the credential and runs the hook.
#[derive(Default)]
pub struct SessionTerminator {
    fired: AtomicBool,
    hook: Mutex<Option<SessionEndHook>>,
}

impl SessionTerminator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_hook(hook: SessionEndHook) -> Self {
        Self {
            fired: AtomicBool::new(false),
            hook: Mutex::new(Some(hook)),
        }
    }

    pub fn set_hook(&self, hook: SessionEndHook) {
        *self.hook.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(hook);
    }

    /// Returns `true` when this call performed the side effect.
    pub fn terminate(&self, store: &CredentialStore) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("session already ended");
            return false;
        }

        warn!("session ended; clearing credential");
        store.clear();
        let hook = self
            .hook
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Re-arm the latch, e.g. after a fresh login.
    pub fn reset(&self) {
        self.fired.store(false, Ordering::Release);
    }
}

impl fmt::Debug for SessionTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTerminator")
            .field("fired", &self.has_fired())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::SessionTerminator;
    use crate::{Credential, CredentialStore};

    #[test]
    fn fires_once_until_reset() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let terminator = SessionTerminator::with_hook(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let store = CredentialStore::in_memory();
        store.set(Credential::new("tok"));

        assert!(terminator.terminate(&store));
        assert_eq!(store.get(), None);

        store.set(Credential::new("tok-2"));
        assert!(!terminator.terminate(&store));
        assert_eq!(store.get(), Some(Credential::new("tok-2")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        terminator.reset();
        assert!(terminator.terminate(&store));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
