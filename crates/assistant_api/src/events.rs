use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sse::SseFrame;
use crate::transcript::Transcript;
use crate::usage::TokenUsage;

pub const EVENT_DATA: &str = "data";
pub const EVENT_METADATA: &str = "metadata";
pub const EVENT_USAGE: &str = "usage";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_END: &str = "end";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
}

/// Optional body of an `error` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamErrorBody {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Run stream event after decoding the SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Transcript fragment to merge by message identity.
    Data(Transcript),
    Metadata(RunMetadata),
    /// Authoritative token usage.
    Usage(TokenUsage),
    Error(Option<StreamErrorBody>),
    /// Explicit `end` event or the connection closing.
    Close,
}

impl StreamEvent {
    /// Decode one frame. Unknown tags yield `Ok(None)`.
    ///
    /// `error` and `end` frames never fail: their payload is optional.
    pub fn from_frame(frame: &SseFrame) -> Result<Option<Self>, serde_json::Error> {
        let event = match frame.event_type() {
            EVENT_DATA => {
                Self::Data(Transcript::from_fragment(serde_json::from_str(&frame.data)?)?)
            }
            EVENT_METADATA => Self::Metadata(serde_json::from_str(&frame.data)?),
            EVENT_USAGE => {
                Self::Usage(serde_json::from_str::<TokenUsage>(&frame.data)?.normalized())
            }
            EVENT_ERROR => Self::Error(parse_error_body(&frame.data)),
            EVENT_END => Self::Close,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data(_) => EVENT_DATA,
            Self::Metadata(_) => EVENT_METADATA,
            Self::Usage(_) => EVENT_USAGE,
            Self::Error(_) => EVENT_ERROR,
            Self::Close => EVENT_END,
        }
    }
}

fn parse_error_body(data: &str) -> Option<StreamErrorBody> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => serde_json::from_value(Value::Object(map)).ok(),
        Ok(Value::String(message)) => Some(StreamErrorBody {
            status_code: None,
            message: Some(message),
        }),
        Ok(_) => None,
        Err(_) => Some(StreamErrorBody {
            status_code: None,
            message: Some(data.to_owned()),
        }),
    }
}
