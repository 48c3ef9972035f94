//! Process-wide holder for the current session credential.
//!
//! The store is a dumb cell: it never inspects the token and never talks to
//! the network. An optional file backend keeps the credential across process
//! restarts.

mod credential;
mod error;
mod paths;
mod schema;
mod store;

pub use credential::Credential;
pub use error::CredentialStoreError;
pub use paths::{credential_file_path, CREDENTIAL_DIR, CREDENTIAL_FILE_NAME};
pub use schema::{CredentialRecord, CredentialRecordType, CREDENTIAL_RECORD_VERSION};
pub use store::{CredentialStore, FileBackend};
