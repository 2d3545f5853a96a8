pub mod decoder;

use serde::{Deserialize, Serialize};

/// Turn-based request body as received on the wire.
///
/// `input` stays untyped here because it may be a plain string or an array
/// of heterogeneous items; [`decoder::decode_turn_request`] normalizes it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnRequestWire {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_output_tokens: Option<u64>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

/// Normalized turn request. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub model: String,
    pub instructions: Option<String>,
    pub input: Vec<InputItem>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<serde_json::Value>,
    pub stream: bool,
    pub max_output_tokens: Option<u64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

/// One replayed history item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputItem {
    Message {
        role: String,
        content: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

/// A declared function tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

/// Life-cycle status of a response document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Failed,
}

/// The turn-based response object, used both as the buffered body and as the
/// payload of the `response.*` life-cycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    pub id: String,
    pub object: String,
    pub created_at: u64,
    pub status: ResponseStatus,
    pub model: String,
    pub output: Vec<ResponseItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ResponseDocument {
    /// Text of the first assistant message, if any.
    #[must_use]
    pub fn output_text(&self) -> Option<&str> {
        self.output.iter().find_map(|item| match item {
            ResponseItem::Message { content, .. } => content.first().map(ContentPart::text),
            ResponseItem::FunctionCall { .. } => None,
        })
    }
}

/// An output item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseItem {
    #[serde(rename = "message")]
    Message {
        id: String,
        status: ItemStatus,
        role: String,
        content: Vec<ContentPart>,
    },
    #[serde(rename = "function_call")]
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        arguments: String,
        status: ItemStatus,
    },
}

impl ResponseItem {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            ResponseItem::Message { id, .. } | ResponseItem::FunctionCall { id, .. } => id,
        }
    }

    /// Copy of this item as announced in `output_item.added`: no content yet,
    /// empty arguments, `in_progress`.
    #[must_use]
    pub fn as_added(&self) -> Self {
        match self {
            ResponseItem::Message { id, role, .. } => ResponseItem::Message {
                id: id.clone(),
                status: ItemStatus::InProgress,
                role: role.clone(),
                content: Vec::new(),
            },
            ResponseItem::FunctionCall {
                id, call_id, name, ..
            } => ResponseItem::FunctionCall {
                id: id.clone(),
                call_id: call_id.clone(),
                name: name.clone(),
                arguments: String::new(),
                status: ItemStatus::InProgress,
            },
        }
    }
}

/// Per-item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
}

/// A content part of an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "output_text")]
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<serde_json::Value>,
    },
}

impl ContentPart {
    #[must_use]
    pub fn output_text(text: impl Into<String>) -> Self {
        ContentPart::OutputText {
            text: text.into(),
            annotations: Vec::new(),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            ContentPart::OutputText { text, .. } => text,
        }
    }
}

/// Token usage in turn-protocol terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Failure details on a `failed` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

/// Streaming life-cycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseStreamEvent {
    #[serde(rename = "response.created")]
    Created { response: ResponseDocument },
    #[serde(rename = "response.in_progress")]
    InProgress { response: ResponseDocument },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        output_index: usize,
        item: ResponseItem,
    },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        item_id: String,
        output_index: usize,
        content_index: usize,
        part: ContentPart,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        item_id: String,
        output_index: usize,
        content_index: usize,
        delta: String,
    },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        item_id: String,
        output_index: usize,
        content_index: usize,
        text: String,
    },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        item_id: String,
        output_index: usize,
        content_index: usize,
        part: ContentPart,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        item_id: String,
        output_index: usize,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        item_id: String,
        output_index: usize,
        arguments: String,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        output_index: usize,
        item: ResponseItem,
    },
    #[serde(rename = "response.completed")]
    Completed { response: ResponseDocument },
    #[serde(rename = "response.failed")]
    Failed { response: ResponseDocument },
}

impl ResponseStreamEvent {
    /// Wire name used for the SSE `event:` line.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            ResponseStreamEvent::Created { .. } => "response.created",
            ResponseStreamEvent::InProgress { .. } => "response.in_progress",
            ResponseStreamEvent::OutputItemAdded { .. } => "response.output_item.added",
            ResponseStreamEvent::ContentPartAdded { .. } => "response.content_part.added",
            ResponseStreamEvent::OutputTextDelta { .. } => "response.output_text.delta",
            ResponseStreamEvent::OutputTextDone { .. } => "response.output_text.done",
            ResponseStreamEvent::ContentPartDone { .. } => "response.content_part.done",
            ResponseStreamEvent::FunctionCallArgumentsDelta { .. } => {
                "response.function_call_arguments.delta"
            }
            ResponseStreamEvent::FunctionCallArgumentsDone { .. } => {
                "response.function_call_arguments.done"
            }
            ResponseStreamEvent::OutputItemDone { .. } => "response.output_item.done",
            ResponseStreamEvent::Completed { .. } => "response.completed",
            ResponseStreamEvent::Failed { .. } => "response.failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_serde_tag() {
        let event = ResponseStreamEvent::OutputTextDelta {
            item_id: "msg_1".into(),
            output_index: 0,
            content_index: 0,
            delta: "hi".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["item_id"], "msg_1");
    }

    #[test]
    fn added_copy_strips_payload() {
        let item = ResponseItem::FunctionCall {
            id: "fc_1".into(),
            call_id: "call_1".into(),
            name: "lookup".into(),
            arguments: "{\"q\":1}".into(),
            status: ItemStatus::Completed,
        };
        let added = item.as_added();
        let ResponseItem::FunctionCall {
            arguments, status, ..
        } = added
        else {
            panic!("expected function call");
        };
        assert!(arguments.is_empty());
        assert_eq!(status, ItemStatus::InProgress);
    }

    #[test]
    fn document_serializes_status_snake_case() {
        let doc = ResponseDocument {
            id: "resp_1".into(),
            object: "response".into(),
            created_at: 1,
            status: ResponseStatus::InProgress,
            model: "m".into(),
            output: Vec::new(),
            usage: None,
            error: None,
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert!(json.get("usage").is_none());
    }
}
