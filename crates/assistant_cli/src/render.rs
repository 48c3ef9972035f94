use assistant_runtime::assistant_api::{MemoryItem, MessageId, StreamState, TokenUsage};

/// Turns successive stream snapshots into the text still to be printed.
///
/// Only the newest AI message is followed. A new message id starts a fresh
/// line; text that was rewritten rather than extended is not reprinted.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    message_id: Option<MessageId>,
    printed: usize,
}

impl TranscriptPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, state: &StreamState) -> String {
        let Some(message) = state
            .transcript
            .as_ref()
            .and_then(|transcript| {
                transcript
                    .messages()
                    .iter()
                    .rev()
                    .find(|message| message.kind.is_ai())
            })
        else {
            return String::new();
        };

        let mut out = String::new();
        if self.message_id.as_ref() != Some(&message.id) {
            if self.message_id.is_some() {
                out.push('\n');
            }
            self.message_id = Some(message.id.clone());
            self.printed = 0;
        }

        let text = message.text();
        if text.len() > self.printed && text.is_char_boundary(self.printed) {
            out.push_str(&text[self.printed..]);
            self.printed = text.len();
        }
        out
    }
}

pub fn usage_line(usage: &TokenUsage) -> String {
    let marker = if usage.estimated { " (estimated)" } else { "" };
    format!(
        "tokens: {} prompt, {} completion, {} total{marker}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    )
}

pub fn memory_line(item: &MemoryItem) -> String {
    match &item.role {
        Some(role) => format!("{}\t[{role}] {}", item.id, item.content),
        None => format!("{}\t{}", item.id, item.content),
    }
}

pub fn percent(fraction: f64) -> u32 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
}
