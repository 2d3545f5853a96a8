//! SSE frame encoding for outbound turn events.

use bytes::Bytes;
use serde::Serialize;

use crate::protocol::turns::ResponseStreamEvent;

#[derive(Serialize)]
struct SequencedEvent<'a> {
    #[serde(flatten)]
    event: &'a ResponseStreamEvent,
    sequence_number: u64,
}

/// Per-response encoder; numbers frames in emission order.
#[derive(Debug, Default)]
pub struct SseEncoder {
    next_sequence: u64,
}

impl SseEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one event as `event: <type>\ndata: <json>\n\n`.
    pub fn encode(&mut self, event: &ResponseStreamEvent) -> Bytes {
        let sequenced = SequencedEvent {
            event,
            sequence_number: self.next_sequence,
        };
        let json = match serde_json::to_string(&sequenced) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!("failed to encode {} event: {err}", event.event_type());
                return Bytes::new();
            }
        };
        self.next_sequence += 1;
        Bytes::from(named_sse_frame(event.event_type(), &json))
    }

    pub fn encode_all(&mut self, events: &[ResponseStreamEvent]) -> Vec<Bytes> {
        events.iter().map(|event| self.encode(event)).collect()
    }
}

/// Format an SSE frame with a named event type.
#[must_use]
pub fn named_sse_frame(event_type: &str, json: &str) -> String {
    let mut out = String::with_capacity(18 + event_type.len() + json.len());
    out.push_str("event: ");
    out.push_str(event_type);
    out.push('\n');
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}
