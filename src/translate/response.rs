use crate::error::BridgeError;
use crate::fc::extract::extract_with_prose;
use crate::protocol::chat::{ChatResponse, ChatUsage};
use crate::protocol::turns::{
    ContentPart, ItemStatus, ResponseDocument, ResponseError, ResponseItem, ResponseStatus,
    ResponseUsage,
};
use crate::util::unix_now_secs;

use super::ids::IdGenerator;

/// A finished tool invocation, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedToolCall {
    /// Upstream-supplied call id, if it sent one.
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// Everything one upstream turn produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    pub text: String,
    pub tool_calls: Vec<CompletedToolCall>,
    pub usage: Option<ChatUsage>,
}

impl TurnOutcome {
    /// Parse a buffered chat completion body. A body that cannot be parsed
    /// yields an empty outcome rather than an error.
    #[must_use]
    pub fn from_chat_body(body: &[u8]) -> Self {
        let response: ChatResponse = match serde_json::from_slice(body) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("unparseable upstream completion body, answering empty: {err}");
                return Self::default();
            }
        };
        let usage = response.usage;
        let Some(choice) = response.choices.into_iter().next() else {
            return Self {
                usage,
                ..Self::default()
            };
        };
        let text = match choice.message.content {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(serde_json::Value::as_str))
                .collect(),
            _ => String::new(),
        };
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| CompletedToolCall {
                id: Some(call.id).filter(|id| !id.is_empty()),
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        Self {
            text,
            tool_calls,
            usage,
        }
    }
}

/// Builds response documents for one request, with ids drawn from a
/// per-request [`IdGenerator`].
#[derive(Debug)]
pub struct ResponseDocumentBuilder {
    id: String,
    created_at: u64,
    model: String,
    ids: IdGenerator,
}

impl ResponseDocumentBuilder {
    #[must_use]
    pub fn new(model: impl Into<String>, mut ids: IdGenerator) -> Self {
        Self {
            id: ids.response_id(),
            created_at: unix_now_secs(),
            model: model.into(),
            ids,
        }
    }

    #[must_use]
    pub fn response_id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn next_message_id(&mut self) -> String {
        self.ids.message_id()
    }

    #[must_use]
    pub fn message_item(id: String, text: impl Into<String>) -> ResponseItem {
        ResponseItem::Message {
            id,
            status: ItemStatus::Completed,
            role: "assistant".to_string(),
            content: vec![ContentPart::output_text(text)],
        }
    }

    /// Function-call item; the upstream call id wins over a generated one.
    pub fn function_call_item(&mut self, call: CompletedToolCall) -> ResponseItem {
        let call_id = call
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.ids.call_id());
        ResponseItem::FunctionCall {
            id: self.ids.function_call_id(),
            call_id,
            name: call.name,
            arguments: call.arguments,
            status: ItemStatus::Completed,
        }
    }

    fn document(&self, status: ResponseStatus) -> ResponseDocument {
        ResponseDocument {
            id: self.id.clone(),
            object: "response".to_string(),
            created_at: self.created_at,
            status,
            model: self.model.clone(),
            output: Vec::new(),
            usage: None,
            error: None,
        }
    }

    /// The document announced by `response.created` and `response.in_progress`.
    #[must_use]
    pub fn in_progress(&self) -> ResponseDocument {
        self.document(ResponseStatus::InProgress)
    }

    #[must_use]
    pub fn finish(&self, output: Vec<ResponseItem>, usage: Option<ChatUsage>) -> ResponseDocument {
        ResponseDocument {
            output,
            usage: usage.map(response_usage),
            ..self.document(ResponseStatus::Completed)
        }
    }

    #[must_use]
    pub fn failed(&self, err: &BridgeError) -> ResponseDocument {
        ResponseDocument {
            error: Some(ResponseError {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
            ..self.document(ResponseStatus::Failed)
        }
    }

    /// Map a completed turn into a document.
    ///
    /// With `extract_tools`, calls are recovered from the text when the
    /// upstream sent none natively, and the remaining prose becomes the
    /// message. A turn with neither text nor calls yields one empty message.
    pub fn build(&mut self, outcome: TurnOutcome, extract_tools: bool) -> ResponseDocument {
        let TurnOutcome {
            mut text,
            mut tool_calls,
            usage,
        } = outcome;

        if extract_tools && tool_calls.is_empty() {
            if let Some(extraction) = extract_with_prose(&text) {
                text = extraction.prose;
                tool_calls = extraction
                    .calls
                    .into_iter()
                    .map(|call| CompletedToolCall {
                        id: None,
                        arguments: call.arguments_json(),
                        name: call.name,
                    })
                    .collect();
            }
        }

        let mut output = Vec::with_capacity(tool_calls.len() + 1);
        if !text.is_empty() || tool_calls.is_empty() {
            let id = self.next_message_id();
            output.push(Self::message_item(id, text));
        }
        for call in tool_calls {
            output.push(self.function_call_item(call));
        }
        self.finish(output, usage)
    }
}

/// Convert chat token usage to turn-protocol usage.
#[must_use]
pub fn response_usage(usage: ChatUsage) -> ResponseUsage {
    ResponseUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage
            .total_tokens
            .unwrap_or(usage.prompt_tokens + usage.completion_tokens),
    }
}
