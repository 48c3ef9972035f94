use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::warn;
use uuid::Uuid;

use crate::usage::TokenUsage;

/// Which of the two legal transcript shapes an assistant expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptShape {
    /// A bare message list (general assistants).
    Flat,
    /// `{ "messages": [...] }` (retrieval-augmented assistants).
    Wrapped,
}

/// Ordered, identity-unique conversation messages in either wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transcript {
    Messages(Vec<Message>),
    State {
        messages: Vec<Message>,
        #[serde(flatten)]
        rest: Map<String, Value>,
    },
}

impl Default for Transcript {
    fn default() -> Self {
        Self::Messages(Vec::new())
    }
}

impl Transcript {
    #[must_use]
    pub fn empty(shape: TranscriptShape) -> Self {
        Self::wrap(Vec::new(), shape)
    }

    #[must_use]
    pub fn wrap(messages: Vec<Message>, shape: TranscriptShape) -> Self {
        match shape {
            TranscriptShape::Flat => Self::Messages(messages),
            TranscriptShape::Wrapped => Self::State {
                messages,
                rest: Map::new(),
            },
        }
    }

    #[must_use]
    pub fn shape(&self) -> TranscriptShape {
        match self {
            Self::Messages(_) => TranscriptShape::Flat,
            Self::State { .. } => TranscriptShape::Wrapped,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        match self {
            Self::Messages(messages) | Self::State { messages, .. } => messages,
        }
    }

    fn messages_mut(&mut self) -> &mut Vec<Message> {
        match self {
            Self::Messages(messages) | Self::State { messages, .. } => messages,
        }
    }

    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Messages(messages) | Self::State { messages, .. } => messages,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }

    pub fn get(&self, id: impl Into<MessageId>) -> Option<&Message> {
        let id = id.into();
        self.messages().iter().find(|message| message.id == id)
    }

    /// Decode a streamed fragment one message at a time.
    ///
    /// A message that does not decode is skipped and its siblings are kept.
    /// Only a payload that is neither a list nor an object holding a
    /// `messages` list is an error.
    pub fn from_fragment(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Array(items) => Ok(Self::Messages(decode_messages(items))),
            Value::Object(mut rest) => match rest.remove("messages") {
                Some(Value::Array(items)) => Ok(Self::State {
                    messages: decode_messages(items),
                    rest,
                }),
                _ => Err(fragment_error()),
            },
            _ => Err(fragment_error()),
        }
    }

    /// Merge `fragment` by message identity.
    ///
    /// A message whose id is already present replaces that entry in place;
    /// any other message is appended. `self` keeps its shape.
    pub fn merge(&mut self, fragment: Transcript) {
        let messages = self.messages_mut();
        for incoming in fragment.into_messages() {
            match messages
                .iter_mut()
                .find(|existing| existing.id == incoming.id)
            {
                Some(existing) => *existing = incoming,
                None => messages.push(incoming),
            }
        }
    }

    /// Usage from the most recent message that carries any.
    #[must_use]
    pub fn infer_usage(&self) -> Option<TokenUsage> {
        self.messages().iter().rev().find_map(Message::usage)
    }
}

fn decode_messages(items: Vec<Value>) -> Vec<Message> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<Message>(item) {
            Ok(message) => Some(message),
            Err(error) => {
                warn!(index, %error, "skipping undecodable transcript message");
                None
            }
        })
        .collect()
}

fn fragment_error() -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(
        "expected a message list or an object with a `messages` list",
    )
}

/// Opaque message identity. Servers send either strings or numbers, and the
/// two never compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Text(String),
    Number(Number),
}

impl MessageId {
    /// A random id for a message created on this side.
    #[must_use]
    pub fn local() -> Self {
        Self::Text(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

/// Role/type tag of a message. Unrecognized tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Human,
    Ai,
    AiChunk,
    System,
    Tool,
    Function,
    Other(String),
}

impl MessageKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
            Self::AiChunk => "AIMessageChunk",
            Self::System => "system",
            Self::Tool => "tool",
            Self::Function => "function",
            Self::Other(value) => value,
        }
    }

    #[must_use]
    pub fn is_ai(&self) -> bool {
        matches!(self, Self::Ai | Self::AiChunk)
    }
}

impl From<String> for MessageKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "human" => Self::Human,
            "ai" => Self::Ai,
            "AIMessageChunk" => Self::AiChunk,
            "system" => Self::System,
            "tool" => Self::Tool,
            "function" => Self::Function,
            _ => Self::Other(value),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_owned()
    }
}

/// Message body: plain text, a list of content blocks, or anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Value>),
    Structured(Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Concatenated text of a plain body or of the `text` blocks of a block list.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    Value::String(text) => Some(text.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect::<Vec<_>>()
                .join(""),
            Self::Structured(value) => value.to_string(),
        }
    }
}

/// Usage block attached by newer model integrations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One conversation message as produced by the server.
///
/// Fields this client does not interpret are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_metadata: Option<Value>,
    #[serde(default)]
    pub example: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// A new human message with a random local id.
    #[must_use]
    pub fn human(content: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("additional_kwargs".to_owned(), Value::Object(Map::new()));
        Self {
            id: MessageId::local(),
            kind: MessageKind::Human,
            content: MessageContent::Text(content.into()),
            tool_calls: Vec::new(),
            usage_metadata: None,
            response_metadata: None,
            example: false,
            extra,
        }
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.content.to_text()
    }

    /// Token usage carried by this message, if any.
    ///
    /// `usage_metadata` wins over `response_metadata.token_usage`.
    #[must_use]
    pub fn usage(&self) -> Option<TokenUsage> {
        if let Some(metadata) = self.usage_metadata {
            let usage = TokenUsage {
                prompt_tokens: metadata.input_tokens,
                completion_tokens: metadata.output_tokens,
                total_tokens: metadata.total_tokens,
                estimated: false,
            };
            return Some(usage.normalized());
        }

        self.response_metadata
            .as_ref()
            .and_then(|metadata| metadata.get("token_usage"))
            .filter(|usage| usage.is_object())
            .and_then(|usage| serde_json::from_value::<TokenUsage>(usage.clone()).ok())
            .map(TokenUsage::normalized)
    }
}
