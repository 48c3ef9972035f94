use std::sync::Arc;

use assistant_api::{
    AuthClient, CancelSignal, Gateway, HttpTransport, IngestBinding, IngestClient, IngestFile,
    MemoryClient, RunClient, RunInput, RunStreamClient, SessionEndHook, SessionTerminator, StreamState,
    Transport,
};
use credential_store::CredentialStore;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;

/// One user turn: optional attachments to ingest, then the run itself.
#[derive(Debug, Clone)]
pub struct Turn {
    pub thread_id: String,
    pub input: RunInput,
    pub config: Value,
    pub attachments: Vec<IngestFile>,
}

impl Turn {
    pub fn new(thread_id: impl Into<String>, input: RunInput) -> Self {
        Self {
            thread_id: thread_id.into(),
            input,
            config: Value::Object(Default::default()),
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<IngestFile>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Explicitly wired service graph. Nothing here is global: tests and hosts
/// build as many independent runtimes as they need.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    store: Arc<CredentialStore>,
    terminator: Arc<SessionTerminator>,
    gateway: Arc<Gateway>,
    stream: RunStreamClient,
    runs: RunClient,
    ingest: IngestClient,
    auth: AuthClient,
    memory: MemoryClient,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.api.clone())?);
        Self::with_transport(config, transport)
    }

    /// Wire the services over a caller-supplied transport.
    pub fn with_transport(
        config: RuntimeConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RuntimeError> {
        let store = Arc::new(match &config.credentials_path {
            Some(path) => CredentialStore::open(path.clone())?,
            None => CredentialStore::in_memory(),
        });
        let terminator = Arc::new(SessionTerminator::new());
        let gateway = Arc::new(Gateway::new(
            transport,
            Arc::clone(&store),
            Arc::clone(&terminator),
        ));

        debug!(
            base_url = config.base_url(),
            persistent = config.credentials_path.is_some(),
            "runtime ready"
        );
        Ok(Self {
            stream: RunStreamClient::new(Arc::clone(&gateway)),
            runs: RunClient::new(Arc::clone(&gateway)),
            ingest: IngestClient::new(Arc::clone(&gateway))
                .with_poll_interval(config.api.poll_interval),
            auth: AuthClient::new(Arc::clone(&gateway)),
            memory: MemoryClient::new(Arc::clone(&gateway)),
            config,
            store,
            terminator,
            gateway,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn terminator(&self) -> &Arc<SessionTerminator> {
        &self.terminator
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn stream(&self) -> &RunStreamClient {
        &self.stream
    }

    pub fn runs(&self) -> &RunClient {
        &self.runs
    }

    pub fn ingest(&self) -> &IngestClient {
        &self.ingest
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub fn memory(&self) -> &MemoryClient {
        &self.memory
    }

    /// Run `hook` once when the session can no longer be renewed.
    pub fn on_session_end(&self, hook: SessionEndHook) {
        self.terminator.set_hook(hook);
    }

    /// Ingest the turn's attachments into its thread, then stream the run.
    ///
    /// The run never starts if ingestion fails or `cancel` is raised first.
    /// Stopping the run itself goes through [`RunStreamClient::stop`].
    pub async fn send_turn<F>(
        &self,
        turn: Turn,
        on_progress: F,
        cancel: Option<&CancelSignal>,
    ) -> Result<StreamState, RuntimeError>
    where
        F: FnMut(f64),
    {
        let Turn {
            thread_id,
            input,
            config,
            attachments,
        } = turn;

        if !attachments.is_empty() {
            info!(%thread_id, files = attachments.len(), "ingesting attachments");
            let binding = IngestBinding::Thread(thread_id.clone());
            self.ingest
                .ingest(attachments, &binding, on_progress, cancel)
                .await?;
        }

        if cancel.is_some_and(CancelSignal::is_cancelled) {
            return Err(assistant_api::ApiError::Cancelled.into());
        }

        Ok(self.stream.start(input, &thread_id, config).await?)
    }
}
