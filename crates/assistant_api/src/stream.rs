use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cancel::{await_or_cancel, CancelSignal};
use crate::error::ApiError;
use crate::events::StreamEvent;
use crate::gateway::Gateway;
use crate::payload::{RunInput, RunRequest};
use crate::sse::SseStreamParser;
use crate::transcript::Transcript;
use crate::transport::ApiRequest;
use crate::url::RUNS_STREAM_PATH;
use crate::usage::TokenUsage;

const START_FAILED_FALLBACK: &str = "Failed to start run";
const STREAM_FAILED_FALLBACK: &str = "Run failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    InFlight,
    Error,
    Done,
}

/// Snapshot of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamState {
    pub status: StreamStatus,
    pub transcript: Option<Transcript>,
    pub run_id: Option<String>,
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
}

impl StreamState {
    #[must_use]
    pub fn in_flight(seed: Option<Transcript>) -> Self {
        Self {
            status: StreamStatus::InFlight,
            transcript: seed,
            run_id: None,
            usage: None,
            error: None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status != StreamStatus::InFlight
    }

    /// Reduce one event into the state.
    ///
    /// `error` is sticky: a later close never turns it back into `done`.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Data(fragment) => {
                match self.transcript.as_mut() {
                    Some(transcript) => transcript.merge(fragment),
                    None => {
                        let mut transcript = Transcript::empty(fragment.shape());
                        transcript.merge(fragment);
                        self.transcript = Some(transcript);
                    }
                }
                if self.usage.is_none() {
                    self.usage = self.transcript.as_ref().and_then(Transcript::infer_usage);
                }
            }
            StreamEvent::Metadata(metadata) => self.run_id = Some(metadata.run_id),
            StreamEvent::Usage(usage) => self.usage = Some(usage),
            StreamEvent::Error(body) => {
                self.status = StreamStatus::Error;
                if let Some(message) = body.and_then(|body| body.message) {
                    self.error = Some(message);
                }
            }
            StreamEvent::Close => {
                if self.status == StreamStatus::InFlight {
                    self.status = StreamStatus::Done;
                }
            }
        }
    }

    fn fail(&mut self, message: String) {
        self.status = StreamStatus::Error;
        self.error = Some(message);
    }
}

/// Drives run turns over `POST /runs/stream` and publishes their state.
///
/// Starting a turn supersedes the previous one: its cancel signal is raised
/// and its later events are no longer published.
#[derive(Debug)]
pub struct RunStreamClient {
    gateway: Arc<Gateway>,
    state_tx: watch::Sender<Option<StreamState>>,
    active: Mutex<Option<CancelSignal>>,
}

impl RunStreamClient {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            gateway,
            state_tx,
            active: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StreamState>> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> Option<StreamState> {
        self.state_tx.borrow().clone()
    }

    /// Run one turn to completion and return its final state.
    ///
    /// A server `error` event yields [`ApiError::StreamFailed`]; a stopped or
    /// superseded turn yields [`ApiError::Cancelled`].
    pub async fn start(
        &self,
        input: RunInput,
        thread_id: &str,
        config: Value,
    ) -> Result<StreamState, ApiError> {
        // A turn that cannot be encoded must not displace the one in flight.
        let (run, seed) = RunRequest::prepare(input, thread_id, config)?;
        let request = ApiRequest::post(RUNS_STREAM_PATH)
            .json(serde_json::to_value(run)?)
            .event_stream();

        let cancel = self.begin_turn();
        self.publish(&cancel, |state| *state = Some(StreamState::in_flight(seed)));
        info!(thread_id, "starting run");

        let outcome = self.drive(request, &cancel).await;
        self.end_turn(&cancel);

        match outcome {
            Ok(()) => {}
            Err(ApiError::Cancelled) => {
                debug!(thread_id, "run cancelled");
                return Err(ApiError::Cancelled);
            }
            Err(error) => {
                warn!(thread_id, %error, "run failed");
                let message = failure_message(&error);
                self.publish(&cancel, |state| {
                    if let Some(state) = state.as_mut() {
                        state.fail(message);
                    }
                });
                return Err(error);
            }
        }

        let state = self.state().unwrap_or_else(|| StreamState::in_flight(None));
        info!(thread_id, status = ?state.status, "run finished");
        if state.status == StreamStatus::Error {
            let message = state
                .error
                .clone()
                .unwrap_or_else(|| STREAM_FAILED_FALLBACK.to_owned());
            return Err(ApiError::StreamFailed(message));
        }
        Ok(state)
    }

    /// Abort the current turn. With `clear`, the transcript is discarded
    /// while the run id and usage are kept.
    pub fn stop(&self, clear: bool) {
        if let Some(cancel) = lock_unpoisoned(&self.active).take() {
            cancel.cancel();
        }

        self.state_tx.send_if_modified(|state| {
            let Some(state) = state.as_mut() else {
                return false;
            };
            if state.status == StreamStatus::InFlight {
                state.status = StreamStatus::Done;
            }
            if clear {
                state.transcript = None;
            }
            true
        });
    }

    async fn drive(&self, request: ApiRequest, cancel: &CancelSignal) -> Result<(), ApiError> {
        let response = await_or_cancel(self.gateway.request(request), Some(cancel)).await??;
        if !response.is_success() {
            let error = await_or_cancel(
                ApiError::from_response(response, START_FAILED_FALLBACK),
                Some(cancel),
            )
            .await?;
            return Err(error);
        }

        let mut bytes = response.into_byte_stream();
        let mut parser = SseStreamParser::default();
        while let Some(chunk) = await_or_cancel(bytes.next(), Some(cancel)).await? {
            let chunk = chunk?;
            for event in parser.feed(&chunk) {
                debug!(event = event.name(), "stream event");
                let finished = matches!(event, StreamEvent::Close);
                self.apply(cancel, event);
                if finished {
                    return Ok(());
                }
            }
        }

        if !parser.is_empty_buffer() {
            debug!("stream closed with an incomplete frame");
        }
        self.apply(cancel, StreamEvent::Close);
        Ok(())
    }

    fn apply(&self, cancel: &CancelSignal, event: StreamEvent) {
        self.publish(cancel, |state| {
            state
                .get_or_insert_with(|| StreamState::in_flight(None))
                .apply(event);
        });
    }

    /// Mutate the published state unless `cancel` has been raised. The check
    /// runs under the channel's lock so it cannot interleave with `stop`.
    fn publish<F>(&self, cancel: &CancelSignal, update: F)
    where
        F: FnOnce(&mut Option<StreamState>),
    {
        self.state_tx.send_if_modified(|state| {
            if cancel.is_cancelled() {
                return false;
            }
            update(state);
            true
        });
    }

    fn begin_turn(&self) -> CancelSignal {
        let cancel = CancelSignal::new();
        if let Some(previous) = lock_unpoisoned(&self.active).replace(cancel.clone()) {
            debug!("superseding previous run");
            previous.cancel();
        }
        cancel
    }

    fn end_turn(&self, cancel: &CancelSignal) {
        let mut active = lock_unpoisoned(&self.active);
        if active.as_ref().is_some_and(|current| current.ptr_eq(cancel)) {
            active.take();
        }
    }
}

fn failure_message(error: &ApiError) -> String {
    match error {
        ApiError::Status { message, .. } | ApiError::StreamFailed(message) => message.clone(),
        other => other.to_string(),
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
