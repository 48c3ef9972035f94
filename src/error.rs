use assistant_api::ApiError;
use credential_store::CredentialStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid {key}={value:?}: {reason}")]
    Config {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    CredentialStore(#[from] CredentialStoreError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl RuntimeError {
    pub(crate) fn config(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Config {
            key,
            value: value.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Cancellation anywhere in a turn, so callers can stay quiet about it.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Api(error) if error.is_cancelled())
    }
}
