use tracing::debug;

use crate::events::StreamEvent;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// The `event:` field, defaulting to `message` as the SSE format does.
    #[must_use]
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental parser for SSE byte streams.
///
/// Bytes are only decoded up to the last complete line, so a UTF-8 sequence
/// or a CRLF pair split across chunks is never mangled.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    pending: Vec<u8>,
    buffer: String,
}

impl SseStreamParser {
    /// Feed arbitrary bytes and drain the run events they complete.
    ///
    /// Unknown event tags and undecodable payloads are dropped.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.feed_frames(bytes)
            .into_iter()
            .filter_map(|frame| match StreamEvent::from_frame(&frame) {
                Ok(Some(event)) => Some(event),
                Ok(None) => {
                    debug!(event = frame.event_type(), "ignoring unknown stream event");
                    None
                }
                Err(error) => {
                    debug!(event = frame.event_type(), %error, "dropping malformed stream event");
                    None
                }
            })
            .collect()
    }

    /// Feed arbitrary bytes and drain complete raw frames.
    pub fn feed_frames(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(bytes);
        if let Some(last_newline) = self.pending.iter().rposition(|byte| *byte == b'\n') {
            let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
            self.buffer.push_str(&String::from_utf8_lossy(&complete));
            if self.buffer.contains('\r') {
                self.buffer = self.buffer.replace("\r\n", "\n");
            }
        }

        let mut frames = Vec::new();
        while let Some(split) = self.buffer.find("\n\n") {
            let block = self.buffer[..split].to_string();
            self.buffer.drain(..split + 2);

            if let Some(frame) = parse_block(&block) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<StreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty() && self.pending.iter().all(u8::is_ascii_whitespace)
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => event = Some(value.trim().to_owned()).filter(|tag| !tag.is_empty()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }

    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}
