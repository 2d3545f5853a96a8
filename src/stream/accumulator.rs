use std::collections::BTreeMap;

use crate::error::BridgeError;
use crate::protocol::chat::{ChatStreamChunk, ChatUsage, FinishReason};
use crate::protocol::turns::{ResponseDocument, ResponseItem, ResponseStreamEvent};
use crate::translate::{CompletedToolCall, ResponseDocumentBuilder, TurnOutcome};

use super::sequencer::EventSequencer;

/// Reducer life cycle. Terminal phases ignore further input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accumulating,
    Completed,
    Failed,
}

#[derive(Debug, Default)]
struct ToolCallFragments {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Partial state of one upstream turn.
///
/// Tool-call entries are keyed by the upstream fragment index and never
/// removed before finalization; `id` and `name` may be revised in place,
/// `arguments` only grows.
#[derive(Debug, Default)]
struct FragmentBuffer {
    text: String,
    /// Set by the first non-empty text fragment.
    message_id: Option<String>,
    tool_calls: BTreeMap<u32, ToolCallFragments>,
}

/// Single-pass reducer over upstream chat deltas.
///
/// In live mode every text fragment is relayed immediately as
/// `output_text.delta`, and finished items plus `response.completed` are
/// emitted at the terminal marker. A finish reason stops content
/// accumulation, but the turn only completes at `[DONE]` or end of body so a
/// trailing usage chunk is still recorded. In collecting mode nothing is emitted and
/// the turn is handed back through [`DeltaAccumulator::into_parts`].
///
/// Tool calls are only announced once the turn finishes, so the item always
/// carries the final upstream call id.
#[derive(Debug)]
pub struct DeltaAccumulator {
    builder: ResponseDocumentBuilder,
    live: bool,
    phase: Phase,
    buffer: FragmentBuffer,
    usage: Option<ChatUsage>,
    finish_reason: Option<FinishReason>,
    document: Option<ResponseDocument>,
    error: Option<BridgeError>,
}

impl DeltaAccumulator {
    #[must_use]
    pub fn live(builder: ResponseDocumentBuilder) -> Self {
        Self::new(builder, true)
    }

    #[must_use]
    pub fn collecting(builder: ResponseDocumentBuilder) -> Self {
        Self::new(builder, false)
    }

    fn new(builder: ResponseDocumentBuilder, live: bool) -> Self {
        Self {
            builder,
            live,
            phase: Phase::Accumulating,
            buffer: FragmentBuffer::default(),
            usage: None,
            finish_reason: None,
            document: None,
            error: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase != Phase::Accumulating
    }

    /// The `response.completed` document, once the turn completed live.
    #[must_use]
    pub fn document(&self) -> Option<&ResponseDocument> {
        self.document.as_ref()
    }

    /// `response.created` and `response.in_progress`.
    #[must_use]
    pub fn opening_events(&self) -> [ResponseStreamEvent; 2] {
        EventSequencer::opening(&self.builder.in_progress())
    }

    /// Consume one `data:` payload.
    pub fn push_data(&mut self, payload: &str, out: &mut Vec<ResponseStreamEvent>) {
        if self.is_terminal() {
            return;
        }
        let payload = payload.trim();
        if payload == "[DONE]" {
            self.complete(out);
            return;
        }
        match serde_json::from_str::<ChatStreamChunk>(payload) {
            Ok(chunk) => self.apply_chunk(chunk, out),
            Err(err) => tracing::debug!("skipping unparseable upstream chunk: {err}"),
        }
    }

    /// Consume one decoded chunk.
    pub fn apply_chunk(&mut self, chunk: ChatStreamChunk, out: &mut Vec<ResponseStreamEvent>) {
        if self.is_terminal() {
            return;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
        if self.finish_reason.is_some() {
            return;
        }
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            self.push_text(text, out);
        }
        for fragment in choice.delta.tool_calls.unwrap_or_default() {
            let entry = self.buffer.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                entry.id = Some(id);
            }
            if let Some(function) = fragment.function {
                if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                    entry.name = name;
                }
                if let Some(arguments) = function.arguments {
                    entry.arguments.push_str(&arguments);
                }
            }
        }

        if let Some(reason) = choice.finish_reason.as_deref() {
            self.finish_reason = Some(FinishReason::from_wire(reason));
        }
    }

    fn push_text(&mut self, text: String, out: &mut Vec<ResponseStreamEvent>) {
        let message_id = match &self.buffer.message_id {
            Some(id) => id.clone(),
            None => {
                let id = self.builder.next_message_id();
                self.buffer.message_id = Some(id.clone());
                if self.live {
                    let announced = ResponseDocumentBuilder::message_item(id.clone(), "");
                    out.extend(EventSequencer::message_opening(0, &announced));
                }
                id
            }
        };
        if self.live {
            out.push(ResponseStreamEvent::OutputTextDelta {
                item_id: message_id,
                output_index: 0,
                content_index: 0,
                delta: text.clone(),
            });
        }
        self.buffer.text.push_str(&text);
    }

    /// Terminal marker. Closes the text unit, synthesizing an empty one when
    /// the turn produced neither text nor tool calls, then finalizes every
    /// accumulated tool call in ascending fragment index.
    fn complete(&mut self, out: &mut Vec<ResponseStreamEvent>) {
        self.phase = Phase::Completed;
        match self.finish_reason {
            Some(FinishReason::Stop | FinishReason::ToolCalls) => {}
            Some(reason) => tracing::debug!("treating finish reason {reason:?} as a normal stop"),
            None => tracing::debug!("upstream sent [DONE] without a finish reason"),
        }
        if !self.live {
            return;
        }

        let buffer = std::mem::take(&mut self.buffer);
        let mut output = Vec::with_capacity(buffer.tool_calls.len() + 1);

        let message_id = match buffer.message_id {
            Some(id) => Some(id),
            None if buffer.tool_calls.is_empty() => {
                let id = self.builder.next_message_id();
                let announced = ResponseDocumentBuilder::message_item(id.clone(), "");
                out.extend(EventSequencer::message_opening(0, &announced));
                Some(id)
            }
            None => None,
        };
        if let Some(id) = message_id {
            let item = ResponseDocumentBuilder::message_item(id, buffer.text);
            out.extend(EventSequencer::message_closing(0, &item));
            output.push(item);
        }

        for (_, fragments) in buffer.tool_calls {
            let item = self.builder.function_call_item(CompletedToolCall {
                id: fragments.id,
                name: fragments.name,
                arguments: fragments.arguments,
            });
            log_tool_call(&item);
            EventSequencer::push_item_events(out, output.len(), &item);
            output.push(item);
        }

        let doc = self.builder.finish(output, self.usage);
        out.push(EventSequencer::closing(&doc));
        self.document = Some(doc);
    }

    /// Transport error. Emits a single `response.failed` in live mode.
    pub fn fail(&mut self, err: BridgeError, out: &mut Vec<ResponseStreamEvent>) {
        if self.is_terminal() {
            return;
        }
        self.phase = Phase::Failed;
        tracing::warn!("upstream stream failed: {err}");
        if self.live {
            out.push(ResponseStreamEvent::Failed {
                response: self.builder.failed(&err),
            });
        }
        self.error = Some(err);
    }

    /// The upstream body ended. After a finish reason this completes the
    /// turn; otherwise it is a premature close and the turn fails.
    pub fn end_of_stream(&mut self, out: &mut Vec<ResponseStreamEvent>) {
        if self.is_terminal() {
            return;
        }
        if self.finish_reason.is_some() {
            self.complete(out);
            return;
        }
        self.fail(
            BridgeError::UpstreamProtocol(
                "upstream stream ended without a finish reason".to_string(),
            ),
            out,
        );
    }

    /// Hand back the builder and the collected turn.
    ///
    /// # Errors
    ///
    /// Returns the stored error when the turn failed, or
    /// [`BridgeError::UpstreamProtocol`] when it never reached a terminal
    /// marker.
    pub fn into_parts(self) -> (ResponseDocumentBuilder, Result<TurnOutcome, BridgeError>) {
        let result = match (self.phase, self.error) {
            (Phase::Failed, Some(err)) => Err(err),
            (Phase::Accumulating, _) | (Phase::Failed, None) => Err(BridgeError::UpstreamProtocol(
                "upstream stream did not complete".to_string(),
            )),
            (Phase::Completed, _) => Ok(TurnOutcome {
                text: self.buffer.text,
                tool_calls: self
                    .buffer
                    .tool_calls
                    .into_values()
                    .map(|fragments| CompletedToolCall {
                        id: fragments.id,
                        name: fragments.name,
                        arguments: fragments.arguments,
                    })
                    .collect(),
                usage: self.usage,
            }),
        };
        (self.builder, result)
    }
}

fn log_tool_call(item: &ResponseItem) {
    if let ResponseItem::FunctionCall {
        name, arguments, ..
    } = item
    {
        tracing::debug!(
            "tool_call: {name}({})",
            crate::util::log_preview(arguments, 100)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::turns::{ResponseStatus, ResponseStreamEvent as Ev};
    use crate::translate::IdGenerator;

    fn live() -> DeltaAccumulator {
        DeltaAccumulator::live(ResponseDocumentBuilder::new("m", IdGenerator::with_seed(1)))
    }

    fn collecting() -> DeltaAccumulator {
        DeltaAccumulator::collecting(ResponseDocumentBuilder::new("m", IdGenerator::with_seed(1)))
    }

    fn feed(acc: &mut DeltaAccumulator, payloads: &[&str]) -> Vec<ResponseStreamEvent> {
        let mut out = Vec::new();
        for payload in payloads {
            acc.push_data(payload, &mut out);
        }
        out
    }

    fn types(events: &[ResponseStreamEvent]) -> Vec<&'static str> {
        events.iter().map(ResponseStreamEvent::event_type).collect()
    }

    #[test]
    fn text_stream_relays_deltas_and_completes() {
        let mut acc = live();
        let events = feed(
            &mut acc,
            &[
                r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
                r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
                r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
                "[DONE]",
            ],
        );
        assert_eq!(
            types(&events),
            vec![
                "response.output_item.added",
                "response.content_part.added",
                "response.output_text.delta",
                "response.output_text.delta",
                "response.output_text.done",
                "response.content_part.done",
                "response.output_item.done",
                "response.completed",
            ]
        );
        let doc = acc.document().unwrap();
        assert_eq!(doc.output_text(), Some("Hello"));
        assert_eq!(doc.status, ResponseStatus::Completed);
        assert_eq!(acc.phase(), Phase::Completed);
    }

    #[test]
    fn fragmented_tool_calls_are_reassembled_by_index() {
        let mut acc = live();
        let events = feed(
            &mut acc,
            &[
                r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"second","arguments":"{\"y\""}}]}}]}"#,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"first","arguments":"{\"x\":"}}]}}]}"#,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"function":{"arguments":":2}"}}]}}]}"#,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"1}"}}]}}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
                "[DONE]",
            ],
        );
        assert!(!types(&events).contains(&"response.output_text.delta"));
        let doc = acc.document().unwrap();
        assert_eq!(doc.output.len(), 2);
        let ResponseItem::FunctionCall {
            call_id,
            name,
            arguments,
            ..
        } = &doc.output[0]
        else {
            panic!("expected function call");
        };
        assert_eq!((call_id.as_str(), name.as_str()), ("call_a", "first"));
        assert_eq!(arguments, r#"{"x":1}"#);
        let ResponseItem::FunctionCall { arguments, .. } = &doc.output[1] else {
            panic!("expected function call");
        };
        assert_eq!(arguments, r#"{"y":2}"#);

        let done_indices: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                Ev::OutputItemDone { output_index, .. } => Some(*output_index),
                _ => None,
            })
            .collect();
        assert_eq!(done_indices, vec![0, 1]);
    }

    #[test]
    fn text_then_tool_calls_keep_text_at_index_zero() {
        let mut acc = live();
        let events = feed(
            &mut acc,
            &[
                r#"{"choices":[{"delta":{"content":"Let me check."}}]}"#,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"ls","arguments":"{}"}}]}}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
                "[DONE]",
            ],
        );
        let doc = acc.document().unwrap();
        assert!(matches!(doc.output[0], ResponseItem::Message { .. }));
        let ResponseItem::FunctionCall { call_id, .. } = &doc.output[1] else {
            panic!("expected function call");
        };
        // No upstream id was sent, so one is generated.
        assert!(call_id.starts_with("call_"));
        assert_eq!(events.last().map(Ev::event_type), Some("response.completed"));
    }

    #[test]
    fn stop_without_text_synthesizes_empty_message() {
        let mut acc = live();
        let events = feed(
            &mut acc,
            &[r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#, "[DONE]"],
        );
        assert_eq!(
            types(&events),
            vec![
                "response.output_item.added",
                "response.content_part.added",
                "response.output_text.done",
                "response.content_part.done",
                "response.output_item.done",
                "response.completed",
            ]
        );
        assert_eq!(acc.document().unwrap().output_text(), Some(""));
    }

    #[test]
    fn malformed_lines_are_skipped_and_late_events_ignored() {
        let mut acc = live();
        let events = feed(
            &mut acc,
            &[
                "{not json",
                r#"{"choices":[{"delta":{"content":"ok"},"finish_reason":"length"}]}"#,
                r#"{"choices":[{"delta":{"content":"late"}}]}"#,
                "[DONE]",
            ],
        );
        assert_eq!(acc.document().unwrap().output_text(), Some("ok"));
        assert_eq!(events.last().map(Ev::event_type), Some("response.completed"));
        assert_eq!(
            types(&events)
                .iter()
                .filter(|t| **t == "response.output_text.delta")
                .count(),
            1
        );
    }

    #[test]
    fn usage_after_finish_chunk_is_recorded() {
        let mut acc = live();
        let events = feed(
            &mut acc,
            &[
                r#"{"choices":[{"delta":{"content":"hi"}}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            ],
        );
        assert!(!types(&events).contains(&"response.completed"));
        assert_eq!(acc.phase(), Phase::Accumulating);

        let events = feed(
            &mut acc,
            &[
                r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":6,"total_tokens":11}}"#,
                "[DONE]",
            ],
        );
        assert_eq!(events.last().map(Ev::event_type), Some("response.completed"));
        let usage = acc.document().unwrap().usage.as_ref().unwrap();
        assert_eq!(usage.total_tokens, 11);
    }

    #[test]
    fn body_ending_after_finish_reason_completes() {
        let mut acc = collecting();
        let mut out = feed(
            &mut acc,
            &[
                r#"{"choices":[{"delta":{"content":"done"},"finish_reason":"stop"}]}"#,
                r#"{"choices":[],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
            ],
        );
        acc.end_of_stream(&mut out);
        assert_eq!(acc.phase(), Phase::Completed);
        let (_, outcome) = acc.into_parts();
        let outcome = outcome.unwrap();
        assert_eq!(outcome.text, "done");
        assert_eq!(outcome.usage.and_then(|u| u.total_tokens), Some(3));
    }

    #[test]
    fn premature_end_fails_once() {
        let mut acc = live();
        let mut events = feed(&mut acc, &[r#"{"choices":[{"delta":{"content":"par"}}]}"#]);
        acc.end_of_stream(&mut events);
        acc.fail(BridgeError::UpstreamUnreachable("again".into()), &mut events);
        let failed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Ev::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(acc.phase(), Phase::Failed);
    }

    #[test]
    fn done_marker_finalizes_pending_tool_calls() {
        let mut acc = live();
        feed(
            &mut acc,
            &[
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"f","arguments":"{}"}}]}}]}"#,
                "[DONE]",
            ],
        );
        let doc = acc.document().unwrap();
        assert_eq!(doc.output.len(), 1);
        assert!(matches!(doc.output[0], ResponseItem::FunctionCall { .. }));
    }

    #[test]
    fn collecting_mode_emits_nothing_and_returns_outcome() {
        let mut acc = collecting();
        let events = feed(
            &mut acc,
            &[
                r#"{"choices":[{"delta":{"content":"{\"tool_calls\":[]}"}}]}"#,
                r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":6,"total_tokens":11}}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
                "[DONE]",
            ],
        );
        assert!(events.is_empty());
        let (builder, outcome) = acc.into_parts();
        let outcome = outcome.unwrap();
        assert_eq!(outcome.text, r#"{"tool_calls":[]}"#);
        assert_eq!(outcome.usage.and_then(|u| u.total_tokens), Some(11));
        assert!(builder.response_id().starts_with("resp_"));
    }

    #[test]
    fn collecting_mode_reports_failure() {
        let mut acc = collecting();
        let mut out = Vec::new();
        acc.end_of_stream(&mut out);
        assert!(out.is_empty());
        let (_, outcome) = acc.into_parts();
        assert!(matches!(outcome, Err(BridgeError::UpstreamProtocol(_))));
    }
}
