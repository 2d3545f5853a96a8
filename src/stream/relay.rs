use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::BridgeError;
use crate::observability::log_request_complete;
use crate::protocol::turns::{ResponseDocument, ResponseStatus, ResponseStreamEvent};
use crate::translate::{ResponseDocumentBuilder, TurnOutcome};

use super::accumulator::DeltaAccumulator;
use super::lines::DataLineDecoder;
use super::sequencer::EventSequencer;
use super::sse::SseEncoder;

/// Upstream body chunks with transport errors already classified.
pub type UpstreamBytes = Pin<Box<dyn Stream<Item = Result<Bytes, BridgeError>> + Send>>;

/// Wrap a reqwest body stream, mapping read errors to
/// [`BridgeError::UpstreamUnreachable`].
#[must_use]
pub fn upstream_bytes(response: reqwest::Response) -> UpstreamBytes {
    Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| BridgeError::UpstreamUnreachable(err.to_string()))),
    )
}

/// Pull-based translation of one upstream chat stream into SSE frames.
///
/// `response.created` is sent immediately; `response.in_progress` waits for
/// the first upstream chunk, so a turn that fails before any data arrives is
/// just created then failed. Live relays forward text as it arrives.
/// Extracting relays hold back every item until the turn is complete, since
/// tool calls can only be recovered from the full text.
pub struct TurnRelay {
    upstream: UpstreamBytes,
    decoder: DataLineDecoder,
    accumulator: Option<DeltaAccumulator>,
    encoder: SseEncoder,
    payloads: Vec<String>,
    events: Vec<ResponseStreamEvent>,
    pending: VecDeque<Bytes>,
    in_progress: Option<ResponseStreamEvent>,
    extract_tools: bool,
    model: String,
    started: Instant,
}

impl TurnRelay {
    #[must_use]
    pub fn new(
        upstream: UpstreamBytes,
        builder: ResponseDocumentBuilder,
        extract_tools: bool,
        started: Instant,
    ) -> Self {
        let model = builder.model().to_string();
        let accumulator = if extract_tools {
            DeltaAccumulator::collecting(builder)
        } else {
            DeltaAccumulator::live(builder)
        };
        let [created, in_progress] = accumulator.opening_events();
        let mut encoder = SseEncoder::new();
        let pending = VecDeque::from([encoder.encode(&created)]);
        Self {
            upstream,
            decoder: DataLineDecoder::new(),
            accumulator: Some(accumulator),
            encoder,
            payloads: Vec::new(),
            events: Vec::new(),
            pending,
            in_progress: Some(in_progress),
            extract_tools,
            model,
            started,
        }
    }

    /// Next SSE frame, or `None` once the terminal event has been sent.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            let accumulator = self.accumulator.as_mut()?;

            match self.upstream.next().await {
                Some(Ok(chunk)) => {
                    self.events.extend(self.in_progress.take());
                    self.decoder.feed(&chunk, &mut self.payloads);
                    for payload in self.payloads.drain(..) {
                        accumulator.push_data(&payload, &mut self.events);
                    }
                }
                Some(Err(err)) => accumulator.fail(err, &mut self.events),
                None => {
                    self.decoder.finish(&mut self.payloads);
                    for payload in self.payloads.drain(..) {
                        accumulator.push_data(&payload, &mut self.events);
                    }
                    accumulator.end_of_stream(&mut self.events);
                }
            }

            if accumulator.is_terminal() {
                self.finish();
            }
            let frames = self.encoder.encode_all(&self.events);
            self.events.clear();
            self.pending.extend(frames);
        }
    }

    fn finish(&mut self) {
        let Some(accumulator) = self.accumulator.take() else {
            return;
        };
        let (status, usage) = if self.extract_tools {
            let doc = collected_document(accumulator, &mut self.events);
            (doc.status, doc.usage)
        } else {
            match accumulator.document() {
                Some(doc) => (doc.status, doc.usage),
                None => (ResponseStatus::Failed, None),
            }
        };
        log_request_complete(&self.model, status_label(status), usage.as_ref(), self.started);
    }

    /// Adapt the relay into a byte stream suitable for a response body.
    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send {
        futures_util::stream::unfold(self, |mut relay| async move {
            relay.next_frame().await.map(|frame| (frame, relay))
        })
    }
}

/// Finalize a collecting accumulator, appending the held-back item events and
/// the terminal event. Returns the terminal document.
fn collected_document(
    accumulator: DeltaAccumulator,
    events: &mut Vec<ResponseStreamEvent>,
) -> ResponseDocument {
    let (mut builder, outcome) = accumulator.into_parts();
    match outcome {
        Ok(outcome) => {
            let doc = builder.build(outcome, true);
            events.extend(EventSequencer::items(&doc));
            events.push(EventSequencer::closing(&doc));
            doc
        }
        Err(err) => {
            let doc = builder.failed(&err);
            events.push(ResponseStreamEvent::Failed {
                response: doc.clone(),
            });
            doc
        }
    }
}

/// Drive an upstream stream to completion without emitting events.
pub async fn collect_turn(
    mut upstream: UpstreamBytes,
    builder: ResponseDocumentBuilder,
) -> (ResponseDocumentBuilder, Result<TurnOutcome, BridgeError>) {
    let mut accumulator = DeltaAccumulator::collecting(builder);
    let mut decoder = DataLineDecoder::new();
    let mut payloads = Vec::new();
    let mut discarded = Vec::new();

    while !accumulator.is_terminal() {
        match upstream.next().await {
            Some(Ok(chunk)) => decoder.feed(&chunk, &mut payloads),
            Some(Err(err)) => accumulator.fail(err, &mut discarded),
            None => {
                decoder.finish(&mut payloads);
                for payload in payloads.drain(..) {
                    accumulator.push_data(&payload, &mut discarded);
                }
                accumulator.end_of_stream(&mut discarded);
                break;
            }
        }
        for payload in payloads.drain(..) {
            accumulator.push_data(&payload, &mut discarded);
        }
    }
    accumulator.into_parts()
}

fn status_label(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::Completed => "completed",
        ResponseStatus::Failed => "failed",
        ResponseStatus::InProgress => "in_progress",
    }
}

/// SSE frames for a turn that failed before the upstream produced a body.
#[must_use]
pub fn failed_turn_frames(builder: &ResponseDocumentBuilder, err: &BridgeError) -> Vec<Bytes> {
    SseEncoder::new().encode_all(&EventSequencer::emit(&builder.failed(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::IdGenerator;

    fn upstream(chunks: Vec<Result<&'static str, BridgeError>>) -> UpstreamBytes {
        Box::pin(futures_util::stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(|s| Bytes::from_static(s.as_bytes()))),
        ))
    }

    fn builder() -> ResponseDocumentBuilder {
        ResponseDocumentBuilder::new("model-x", IdGenerator::with_seed(3))
    }

    async fn event_types(relay: TurnRelay) -> Vec<serde_json::Value> {
        let frames: Vec<Bytes> = relay.into_stream().collect().await;
        frames
            .iter()
            .map(|frame| {
                let text = std::str::from_utf8(frame).unwrap();
                let data = text
                    .lines()
                    .find_map(|line| line.strip_prefix("data: "))
                    .unwrap();
                serde_json::from_str(data).unwrap()
            })
            .collect()
    }

    fn types(events: &[serde_json::Value]) -> Vec<&str> {
        events
            .iter()
            .map(|event| event["type"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn live_relay_streams_text_in_order() {
        let relay = TurnRelay::new(
            upstream(vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n"),
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n"),
                Ok("data: [DONE]\n\n"),
            ]),
            builder(),
            false,
            Instant::now(),
        );
        let events = event_types(relay).await;
        assert_eq!(
            types(&events),
            vec![
                "response.created",
                "response.in_progress",
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
        assert_eq!(events[6]["text"], "Hello");
        let sequence: Vec<u64> = events
            .iter()
            .map(|e| e["sequence_number"].as_u64().unwrap())
            .collect();
        assert_eq!(sequence, (0..10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn extracting_relay_holds_items_until_completion() {
        let relay = TurnRelay::new(
            upstream(vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"tool_calls\\\":[{\\\"name\\\":\\\"get_weather\\\",\"}}]}\n\n"),
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"\\\"arguments\\\":{\\\"city\\\":\\\"Oslo\\\"}}]}\"},\"finish_reason\":\"stop\"}]}\n\n"),
            ]),
            builder(),
            true,
            Instant::now(),
        );
        let events = event_types(relay).await;
        assert_eq!(
            types(&events),
            vec![
                "response.created",
                "response.in_progress",
                "response.output_item.added",
                "response.function_call_arguments.delta",
                "response.function_call_arguments.done",
                "response.output_item.done",
                "response.completed",
            ]
        );
        let item = &events[5]["item"];
        assert_eq!(item["name"], "get_weather");
        assert_eq!(item["arguments"], "{\"city\":\"Oslo\"}");
    }

    #[tokio::test]
    async fn premature_close_fails_the_turn() {
        let relay = TurnRelay::new(
            upstream(vec![Ok(
                "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            )]),
            builder(),
            false,
            Instant::now(),
        );
        let events = event_types(relay).await;
        let last = events.last().unwrap();
        assert_eq!(last["type"], "response.failed");
        assert_eq!(last["response"]["status"], "failed");
        assert_eq!(
            types(&events)
                .iter()
                .filter(|t| **t == "response.completed")
                .count(),
            0
        );
    }

    #[tokio::test]
    async fn transport_error_fails_the_turn_once() {
        let relay = TurnRelay::new(
            upstream(vec![Err(BridgeError::UpstreamUnreachable("reset".into()))]),
            builder(),
            true,
            Instant::now(),
        );
        let events = event_types(relay).await;
        assert_eq!(types(&events), vec!["response.created", "response.failed"]);
        assert_eq!(
            events[1]["response"]["error"]["code"],
            "upstream_unreachable"
        );
        assert_eq!(events[1]["sequence_number"], 1);
    }

    #[tokio::test]
    async fn empty_body_is_created_then_failed() {
        let relay = TurnRelay::new(upstream(Vec::new()), builder(), false, Instant::now());
        let events = event_types(relay).await;
        assert_eq!(types(&events), vec!["response.created", "response.failed"]);
    }

    #[tokio::test]
    async fn trailing_usage_reaches_completed_document() {
        let relay = TurnRelay::new(
            upstream(vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"hi\"},\"finish_reason\":\"stop\"}]}\n\n"),
                Ok("data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":6,\"total_tokens\":11}}\n\n"),
                Ok("data: [DONE]\n\n"),
            ]),
            builder(),
            false,
            Instant::now(),
        );
        let events = event_types(relay).await;
        let completed = events.last().unwrap();
        assert_eq!(completed["type"], "response.completed");
        assert_eq!(completed["response"]["usage"]["total_tokens"], 11);
        assert_eq!(completed["response"]["output"][0]["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn collect_turn_gathers_text_and_calls() {
        let (_, outcome) = collect_turn(
            upstream(vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"ok\",\"tool_calls\":[{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"f\",\"arguments\":\"{}\"}}]}}]}\n\n"),
                Ok("data: [DONE]\n\n"),
            ]),
            builder(),
        )
        .await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.text, "ok");
        assert!(outcome.usage.is_none());
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].id.as_deref(), Some("call_a"));
    }

    #[tokio::test]
    async fn collect_turn_reads_usage_after_finish() {
        let (_, outcome) = collect_turn(
            upstream(vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}]}\n\n"),
                Ok("data: {\"choices\":[],\"usage\":{\"prompt_tokens\":2,\"completion_tokens\":3,\"total_tokens\":5}}\n\n"),
            ]),
            builder(),
        )
        .await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.text, "ok");
        assert_eq!(outcome.usage.and_then(|u| u.total_tokens), Some(5));
    }

    #[test]
    fn failed_turn_frames_are_created_then_failed() {
        let frames = failed_turn_frames(
            &builder(),
            &BridgeError::UpstreamUnreachable("refused".into()),
        );
        assert_eq!(frames.len(), 2);
        assert!(std::str::from_utf8(&frames[1])
            .unwrap()
            .starts_with("event: response.failed\n"));
    }
}
