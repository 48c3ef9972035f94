#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use assistant_api::{
    ApiError, ApiRequest, ApiResponse, Credential, CredentialStore, Gateway, SessionTerminator,
    Transport,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::Value;

#[derive(Debug, Clone)]
enum Chunk {
    Data(Bytes),
    Fail(String),
}

/// One scripted reply for a path.
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    chunks: Vec<Chunk>,
    delay: Duration,
    hang: bool,
    refuse: Option<String>,
}

impl Reply {
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).expect("valid status"),
            chunks: vec![Chunk::Data(Bytes::copy_from_slice(body.as_bytes()))],
            delay: Duration::ZERO,
            hang: false,
            refuse: None,
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self::text(status, &body.to_string())
    }

    pub fn status(status: u16) -> Self {
        Self::text(status, "")
    }

    /// An event stream with one chunk per `(event, data)` frame.
    pub fn sse(frames: &[(&str, &str)]) -> Self {
        let mut reply = Self::status(200);
        reply.chunks = frames
            .iter()
            .map(|(event, data)| Chunk::Data(Bytes::from(sse_frame(event, data))))
            .collect();
        reply
    }

    /// Transport-level failure before any response.
    pub fn refused(message: &str) -> Self {
        let mut reply = Self::status(200);
        reply.refuse = Some(message.to_owned());
        reply
    }

    /// Append a body read failure after the scripted chunks.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.chunks.push(Chunk::Fail(message.to_owned()));
        self
    }

    /// Keep the body open after the scripted chunks.
    pub fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub fn sse_frame(event: &str, data: &str) -> String {
    format!("event: {event}\r\ndata: {data}\r\n\r\n")
}

/// In-memory [`Transport`] replaying scripted replies per path.
///
/// Replies for a path are consumed in order; the last one repeats. Unscripted
/// paths answer 404.
#[derive(Default)]
pub struct FakeTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, path: &str, reply: Reply) {
        lock_unpoisoned(&self.scripts)
            .entry(path.to_owned())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    pub fn count(&self, path: &str) -> usize {
        lock_unpoisoned(&self.requests)
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    /// `Authorization` header values sent to `path`, in order.
    pub fn authorizations(&self, path: &str) -> Vec<Option<String>> {
        lock_unpoisoned(&self.requests)
            .iter()
            .filter(|request| request.path == path)
            .map(|request| {
                request
                    .headers
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned)
            })
            .collect()
    }

    fn next_reply(&self, path: &str) -> Reply {
        let mut scripts = lock_unpoisoned(&self.scripts);
        match scripts.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().expect("non-empty queue"),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Reply::status(404)),
            None => Reply::status(404),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let path = request.path.clone();
        lock_unpoisoned(&self.requests).push(request);
        let reply = self.next_reply(&path);

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        if let Some(message) = reply.refuse {
            return Err(ApiError::Transport(message));
        }

        let chunks = reply.chunks.into_iter().map(|chunk| match chunk {
            Chunk::Data(bytes) => Ok(bytes),
            Chunk::Fail(message) => Err(ApiError::Transport(message)),
        });
        let body = if reply.hang {
            stream::iter(chunks).chain(stream::pending()).boxed()
        } else {
            stream::iter(chunks).boxed()
        };
        Ok(ApiResponse::new(reply.status, body))
    }
}

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub store: Arc<CredentialStore>,
    pub terminator: Arc<SessionTerminator>,
    pub gateway: Arc<Gateway>,
    pub session_ends: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(token: Option<&str>) -> Self {
        let transport = FakeTransport::new();
        let store = Arc::new(CredentialStore::in_memory());
        if let Some(token) = token {
            store.set(Credential::new(token));
        }

        let session_ends = Arc::new(AtomicUsize::new(0));
        let terminator = Arc::new(SessionTerminator::with_hook(Arc::new({
            let session_ends = Arc::clone(&session_ends);
            move || {
                session_ends.fetch_add(1, Ordering::AcqRel);
            }
        })));

        let dyn_transport: Arc<dyn Transport> = transport.clone();
        let gateway = Arc::new(Gateway::new(
            dyn_transport,
            Arc::clone(&store),
            Arc::clone(&terminator),
        ));

        Self {
            transport,
            store,
            terminator,
            gateway,
            session_ends,
        }
    }

    pub fn session_ends(&self) -> usize {
        self.session_ends.load(Ordering::Acquire)
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
