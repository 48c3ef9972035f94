use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cooperative cancellation flag shared between a caller and a running operation.
///
/// Raising the flag never interrupts work already handed to the network; the
/// operation observes it at its next await point.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

pub(crate) fn is_cancelled(cancel: Option<&CancelSignal>) -> bool {
    cancel.is_some_and(CancelSignal::is_cancelled)
}

/// Drive `future` to completion unless `cancel` is raised first.
pub(crate) async fn await_or_cancel<F>(
    future: F,
    cancel: Option<&CancelSignal>,
) -> Result<F::Output, ApiError>
where
    F: Future,
{
    let Some(cancel) = cancel else {
        return Ok(future.await);
    };

    let mut future = Box::pin(future);
    loop {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{await_or_cancel, CancelSignal};
    use crate::error::ApiError;

    #[tokio::test]
    async fn completes_when_never_cancelled() {
        let cancel = CancelSignal::new();
        let value = await_or_cancel(async { 7 }, Some(&cancel))
            .await
            .expect("future should complete");
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn raised_flag_interrupts_pending_future() {
        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let result = await_or_cancel(std::future::pending::<()>(), Some(&cancel)).await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
    }
}
