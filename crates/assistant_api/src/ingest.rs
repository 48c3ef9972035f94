use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::cancel::{await_or_cancel, is_cancelled, CancelSignal};
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::transport::{ApiRequest, FilePart};
use crate::url::{ingest_cancel_path, ingest_job_path, INGEST_PATH};

const UPLOAD_FALLBACK: &str = "Failed to upload files";
const STATUS_FALLBACK: &str = "Failed to fetch ingest status";
const CANCEL_FALLBACK: &str = "Failed to cancel ingest";
const JOB_FAILED_FALLBACK: &str = "Ingestion failed";

const FILES_FIELD: &str = "files";
const CONFIG_FIELD: &str = "config";

/// A file queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFile {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl IngestFile {
    /// The MIME type is guessed from the file name.
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let mime_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_owned();
        Self {
            name,
            mime_type,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ApiError::InvalidRequest(format!("{} has no file name", path.display()))
            })?;
        let content = tokio::fs::read(path).await.map_err(|error| {
            ApiError::InvalidRequest(format!("failed to read {}: {error}", path.display()))
        })?;
        Ok(Self::new(name, content))
    }

    fn into_part(self) -> FilePart {
        FilePart {
            field: FILES_FIELD.to_owned(),
            file_name: self.name,
            mime_type: self.mime_type,
            content: self.content,
        }
    }
}

/// Where ingested documents are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestBinding {
    Thread(String),
    Assistant(String),
}

impl IngestBinding {
    /// The `config` form field.
    #[must_use]
    pub fn config_json(&self) -> String {
        let configurable = match self {
            Self::Thread(id) => json!({ "thread_id": id }),
            Self::Assistant(id) => json!({ "assistant_id": id }),
        };
        json!({ "configurable": configurable }).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Running,
    Done,
    Error,
    Canceled,
    /// Anything else the server reports; polled like `running`.
    #[serde(other)]
    Unknown,
}

impl IngestStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestJob {
    pub job_id: String,
    pub status: IngestStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl IngestJob {
    /// Progress clamped to `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.progress.is_nan() {
            0.0
        } else {
            self.progress.clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    job_id: Option<String>,
}

/// Client for the asynchronous file-ingestion job endpoints.
#[derive(Debug, Clone)]
pub struct IngestClient {
    gateway: Arc<Gateway>,
    poll_interval: Duration,
}

impl IngestClient {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Upload `files`. `Ok(None)` means there was nothing to ingest.
    pub async fn submit(
        &self,
        files: Vec<IngestFile>,
        binding: &IngestBinding,
    ) -> Result<Option<String>, ApiError> {
        if files.is_empty() {
            debug!("no files to ingest");
            return Ok(None);
        }

        let count = files.len();
        let parts = files.into_iter().map(IngestFile::into_part).collect();
        let fields = vec![(CONFIG_FIELD.to_owned(), binding.config_json())];
        let request = ApiRequest::post(INGEST_PATH).multipart(parts, fields);

        let response = self.gateway.request(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response, UPLOAD_FALLBACK).await);
        }

        let body = response.text().await?;
        let job_id = serde_json::from_str::<SubmitResponse>(&body)
            .ok()
            .and_then(|submitted| submitted.job_id)
            .filter(|job_id| !job_id.trim().is_empty());
        match &job_id {
            Some(job_id) => info!(%job_id, files = count, "ingest job submitted"),
            None => debug!(files = count, "ingest returned no job"),
        }
        Ok(job_id)
    }

    pub async fn status(&self, job_id: &str) -> Result<IngestJob, ApiError> {
        let response = self
            .gateway
            .request(ApiRequest::get(ingest_job_path(job_id)?))
            .await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response, STATUS_FALLBACK).await);
        }
        response.json().await
    }

    /// Poll until the job reaches a terminal state.
    ///
    /// `on_progress` sees every non-terminal progress fraction. The signal is
    /// checked before each request and during the sleep between polls; a
    /// request already sent is allowed to finish.
    pub async fn poll<F>(
        &self,
        job_id: &str,
        mut on_progress: F,
        cancel: Option<&CancelSignal>,
    ) -> Result<(), ApiError>
    where
        F: FnMut(f64),
    {
        loop {
            if is_cancelled(cancel) {
                debug!(job_id, "ingest poll cancelled");
                return Err(ApiError::Cancelled);
            }

            let job = self.status(job_id).await?;
            debug!(job_id, status = ?job.status, progress = job.progress, "ingest status");
            match job.status {
                IngestStatus::Done => {
                    info!(job_id, "ingest job done");
                    return Ok(());
                }
                IngestStatus::Error => {
                    let message = job
                        .error
                        .filter(|message| !message.trim().is_empty())
                        .unwrap_or_else(|| JOB_FAILED_FALLBACK.to_owned());
                    return Err(ApiError::JobFailed(message));
                }
                IngestStatus::Canceled => return Err(ApiError::Cancelled),
                IngestStatus::Running | IngestStatus::Unknown => on_progress(job.fraction()),
            }

            await_or_cancel(tokio::time::sleep(self.poll_interval), cancel).await?;
        }
    }

    /// Ask the server to stop the job. Local polling is unaffected.
    pub async fn cancel(&self, job_id: &str) -> Result<(), ApiError> {
        let response = self
            .gateway
            .request(ApiRequest::post(ingest_cancel_path(job_id)?))
            .await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response, CANCEL_FALLBACK).await);
        }
        info!(job_id, "ingest job cancel requested");
        Ok(())
    }

    /// Submit and, when a job was created, poll it to completion.
    pub async fn ingest<F>(
        &self,
        files: Vec<IngestFile>,
        binding: &IngestBinding,
        on_progress: F,
        cancel: Option<&CancelSignal>,
    ) -> Result<Option<String>, ApiError>
    where
        F: FnMut(f64),
    {
        if is_cancelled(cancel) {
            return Err(ApiError::Cancelled);
        }
        let Some(job_id) = self.submit(files, binding).await? else {
            return Ok(None);
        };
        self.poll(&job_id, on_progress, cancel).await?;
        Ok(Some(job_id))
    }
}
