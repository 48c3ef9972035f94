use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::transcript::{Message, Transcript, TranscriptShape};

/// Body of `POST /runs` and `POST /runs/stream`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRequest {
    pub input: Value,
    pub thread_id: String,
    pub config: Value,
}

impl RunRequest {
    pub fn new(input: Value, thread_id: impl Into<String>, config: Value) -> Self {
        Self {
            input,
            thread_id: thread_id.into(),
            config,
        }
    }

    /// Checks `config` and prepares `input`, returning the request together
    /// with the transcript it seeds. Nothing is sent.
    pub fn prepare(
        input: RunInput,
        thread_id: &str,
        config: Value,
    ) -> Result<(Self, Option<Transcript>), ApiError> {
        if !(config.is_object() || config.is_null()) {
            return Err(ApiError::InvalidRequest(
                "run config must be a JSON object".to_owned(),
            ));
        }
        let (input, seed) = input.prepare()?;
        Ok((Self::new(input, thread_id, config), seed))
    }
}

/// What a turn sends as its `input`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    /// A fresh user message, wrapped in the shape the target assistant expects.
    Message {
        content: String,
        shape: TranscriptShape,
    },
    /// A caller-built transcript, sent as-is.
    Transcript(Transcript),
    /// Continue the thread without new input.
    Resume,
}

impl RunInput {
    pub fn message(content: impl Into<String>, shape: TranscriptShape) -> Self {
        Self::Message {
            content: content.into(),
            shape,
        }
    }

    /// Encode the wire `input` and the transcript that seeds the turn.
    pub fn prepare(self) -> Result<(Value, Option<Transcript>), serde_json::Error> {
        match self {
            Self::Message { content, shape } => {
                let seed = Transcript::wrap(vec![Message::human(content)], shape);
                Ok((serde_json::to_value(&seed)?, Some(seed)))
            }
            Self::Transcript(transcript) => Ok((serde_json::to_value(&transcript)?, None)),
            Self::Resume => Ok((Value::Null, None)),
        }
    }
}
