//! Composition root for the assistant client runtime.
//!
//! [`Runtime`] builds the credential store, session terminator, gateway and
//! endpoint clients from a [`RuntimeConfig`] and exposes
//! [`Runtime::send_turn`], which ingests a turn's attachments before its run
//! stream starts.

pub mod config;
pub mod error;
pub mod runtime;

pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use runtime::{Runtime, Turn};

pub use assistant_api;
pub use credential_store;
