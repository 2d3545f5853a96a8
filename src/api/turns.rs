use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::error::{into_axum_response, BridgeError};
use crate::observability::log_request_complete;
use crate::protocol::turns::decoder::decode_turn_request;
use crate::protocol::turns::{ResponseDocument, TurnRequest};
use crate::state::AppState;
use crate::stream::{collect_turn, failed_turn_frames, upstream_bytes, TurnRelay};
use crate::translate::{translate_request, IdGenerator, ResponseDocumentBuilder, TurnOutcome};

use super::common::{json_response, sse_ok_response};

/// How one turn is carried out, fixed before the upstream call.
struct TurnPlan {
    /// The caller asked for an event stream.
    stream_to_caller: bool,
    /// The upstream is asked for a delta stream.
    stream_from_upstream: bool,
    /// Tool calls must be recovered from the text.
    extract_tools: bool,
}

impl TurnPlan {
    fn new(state: &AppState, request: &TurnRequest) -> Self {
        let upstream = &state.config.upstream;
        Self {
            stream_to_caller: request.stream,
            stream_from_upstream: request.stream || upstream.force_stream,
            extract_tools: !upstream.fc_mode.is_native() && !request.tools.is_empty(),
        }
    }
}

/// `POST /turns`: translate, call the upstream, and answer either with an
/// event stream or a single response document.
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let started = Instant::now();
    let request = match decode_turn_request(&body, &state.config.upstream.default_model) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!("rejecting turn request: {err}");
            return into_axum_response(&err);
        }
    };

    let plan = TurnPlan::new(&state, &request);
    let mut chat = translate_request(&request, &state.translate_options());
    chat.stream = plan.stream_from_upstream;
    tracing::info!(
        model = %request.model,
        stream = plan.stream_to_caller,
        items = request.input.len(),
        tools = request.tools.len(),
        extract_tools = plan.extract_tools,
        "turn request"
    );

    let chat_body = match serde_json::to_vec(&chat) {
        Ok(bytes) => Bytes::from(bytes),
        Err(err) => {
            return into_axum_response(&BridgeError::Internal(format!(
                "failed to encode upstream request: {err}"
            )));
        }
    };
    let builder = ResponseDocumentBuilder::new(request.model, IdGenerator::new());

    if plan.stream_to_caller {
        stream_turn(&state, &headers, chat_body, builder, &plan, started).await
    } else {
        buffered_turn(&state, &headers, chat_body, builder, &plan, started).await
    }
}

async fn stream_turn(
    state: &AppState,
    headers: &HeaderMap,
    chat_body: Bytes,
    builder: ResponseDocumentBuilder,
    plan: &TurnPlan,
    started: Instant,
) -> Response {
    let response = match state.transport.send_chat(headers, chat_body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!("upstream call failed before streaming: {err}");
            log_request_complete(builder.model(), "failed", None, started);
            let frames = failed_turn_frames(&builder, &err);
            let body = Body::from_stream(
                futures_util::stream::iter(frames).map(Ok::<Bytes, Infallible>),
            );
            return sse_ok_response(body);
        }
    };

    let relay = TurnRelay::new(
        upstream_bytes(response),
        builder,
        plan.extract_tools,
        started,
    );
    let body = Body::from_stream(relay.into_stream().map(Ok::<Bytes, Infallible>));
    sse_ok_response(body)
}

async fn buffered_turn(
    state: &AppState,
    headers: &HeaderMap,
    chat_body: Bytes,
    mut builder: ResponseDocumentBuilder,
    plan: &TurnPlan,
    started: Instant,
) -> Response {
    let result = match state.transport.send_chat(headers, chat_body).await {
        Ok(response) if plan.stream_from_upstream => {
            let (returned, outcome) = collect_turn(upstream_bytes(response), builder).await;
            builder = returned;
            outcome
        }
        Ok(response) => response
            .bytes()
            .await
            .map(|body| TurnOutcome::from_chat_body(&body))
            .map_err(|err| BridgeError::UpstreamUnreachable(err.to_string())),
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => {
            let doc = builder.build(outcome, plan.extract_tools);
            log_completed(&doc, started);
            json_response(&doc)
        }
        Err(err) => {
            tracing::warn!("turn failed: {err}");
            log_request_complete(builder.model(), "failed", None, started);
            into_axum_response(&err)
        }
    }
}

fn log_completed(doc: &ResponseDocument, started: Instant) {
    log_request_complete(&doc.model, "completed", doc.usage.as_ref(), started);
}
