//! Client-side runtime primitives for the assistant service.
//!
//! Every outbound call goes through the [`Gateway`], which attaches the
//! current bearer credential, renews it once through the single-flight
//! [`RefreshCoordinator`] on 401/403, and fires the one-shot session-ended
//! side effect when renewal is impossible.
//!
//! On top of the gateway sit the endpoint clients: [`RunStreamClient`] for
//! the SSE run stream (transcript reconstruction and token usage),
//! [`RunClient`] for background runs and feedback, [`IngestClient`] for
//! file-ingestion jobs, [`AuthClient`] and [`MemoryClient`].
//!
//! No component here owns a global. Callers construct the services and share
//! them through `Arc`.

pub mod auth;
pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod headers;
pub mod ingest;
pub mod memory;
pub mod payload;
pub mod refresh;
pub mod runs;
pub mod session;
pub mod sse;
pub mod stream;
pub mod transcript;
pub mod transport;
pub mod url;
pub mod usage;

pub use auth::{AuthClient, TokenResponse, User};
pub use cancel::CancelSignal;
pub use config::ApiConfig;
pub use error::ApiError;
pub use events::{RunMetadata, StreamErrorBody, StreamEvent};
pub use gateway::Gateway;
pub use ingest::{IngestBinding, IngestClient, IngestFile, IngestJob, IngestStatus};
pub use memory::{MemoryClient, MemoryItem};
pub use payload::{RunInput, RunRequest};
pub use refresh::RefreshCoordinator;
pub use runs::{RunClient, RunFeedback};
pub use session::{SessionEndHook, SessionTerminator};
pub use sse::{SseFrame, SseStreamParser};
pub use stream::{RunStreamClient, StreamState, StreamStatus};
pub use transcript::{
    Message, MessageContent, MessageId, MessageKind, Transcript, TranscriptShape,
};
pub use transport::{ApiRequest, ApiResponse, FilePart, HttpTransport, RequestBody, Transport};
pub use usage::TokenUsage;

pub use credential_store::{Credential, CredentialStore};
