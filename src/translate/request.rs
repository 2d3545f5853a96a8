use rustc_hash::FxHashMap;

use crate::fc::prompt::{generate_tool_prompt, ToolChoiceMode};
use crate::protocol::chat::{ChatMessage, ChatRequest, ChatRole, ChatTool, ChatToolCall, ChatToolFunction};
use crate::protocol::turns::{InputItem, ToolDefinition, TurnRequest};

/// Knobs that shape request translation.
#[derive(Debug, Clone, Copy)]
pub struct TranslateOptions<'a> {
    /// Upstream accepts native `tools` and emits structured tool-call deltas.
    pub native_tools: bool,
    pub convert_developer_to_system: bool,
    pub prompt_template: Option<&'a str>,
    /// Sent as the only user turn when the history has none.
    pub placeholder_user_message: &'a str,
}

impl Default for TranslateOptions<'_> {
    fn default() -> Self {
        Self {
            native_tools: true,
            convert_developer_to_system: true,
            prompt_template: None,
            placeholder_user_message: DEFAULT_PLACEHOLDER_USER_MESSAGE,
        }
    }
}

pub const DEFAULT_PLACEHOLDER_USER_MESSAGE: &str = "Continue.";

/// Translate a turn request into a flat chat request.
///
/// Ordering is preserved: the system message (instructions plus, in text
/// mode, the tool-use protocol) comes first, followed by the history in turn
/// order. Consecutive function calls collapse into one assistant turn.
#[must_use]
pub fn translate_request(request: &TurnRequest, options: &TranslateOptions<'_>) -> ChatRequest {
    let inject_tools = !options.native_tools && !request.tools.is_empty();
    let mut messages = Vec::with_capacity(request.input.len() + 2);

    let mut system = request.instructions.clone().unwrap_or_default();
    if inject_tools {
        let tool_choice = ToolChoiceMode::from_value(request.tool_choice.as_ref());
        let tool_prompt =
            generate_tool_prompt(&request.tools, &tool_choice, options.prompt_template);
        let tool_prompt = tool_prompt.trim();
        if system.is_empty() {
            system = tool_prompt.to_string();
        } else {
            system.push_str("\n\n");
            system.push_str(tool_prompt);
        }
    }
    if !system.is_empty() {
        messages.push(ChatMessage::text(ChatRole::System, system));
    }

    let call_names: FxHashMap<&str, &str> = request
        .input
        .iter()
        .filter_map(|item| match item {
            InputItem::FunctionCall { call_id, name, .. } => Some((call_id.as_str(), name.as_str())),
            _ => None,
        })
        .collect();

    let mut pending_calls: Vec<&InputItem> = Vec::new();
    for item in &request.input {
        match item {
            InputItem::FunctionCall { .. } => pending_calls.push(item),
            InputItem::Message { role, content } => {
                flush_calls(&mut messages, &mut pending_calls, inject_tools);
                messages.push(ChatMessage::text(
                    map_role(role, options.convert_developer_to_system),
                    content.clone(),
                ));
            }
            InputItem::FunctionCallOutput { call_id, output } => {
                flush_calls(&mut messages, &mut pending_calls, inject_tools);
                messages.push(if inject_tools {
                    ChatMessage::text(
                        ChatRole::User,
                        format_tool_result(call_id, call_names.get(call_id.as_str()).copied(), output),
                    )
                } else {
                    ChatMessage {
                        role: ChatRole::Tool,
                        content: Some(output.clone()),
                        tool_calls: None,
                        tool_call_id: Some(call_id.clone()),
                    }
                });
            }
        }
    }
    flush_calls(&mut messages, &mut pending_calls, inject_tools);

    if messages.iter().all(|m| m.role == ChatRole::System) {
        messages.push(ChatMessage::text(
            ChatRole::User,
            options.placeholder_user_message,
        ));
    }

    let (tools, tool_choice) = if options.native_tools && !request.tools.is_empty() {
        (
            Some(request.tools.iter().map(chat_tool).collect()),
            request.tool_choice.clone(),
        )
    } else {
        (None, None)
    };

    ChatRequest {
        model: request.model.clone(),
        messages,
        tools,
        tool_choice,
        stream: request.stream,
        max_tokens: request.max_output_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
    }
}

fn map_role(role: &str, convert_developer_to_system: bool) -> ChatRole {
    match role {
        "system" => ChatRole::System,
        "developer" if convert_developer_to_system => ChatRole::System,
        "developer" => ChatRole::Developer,
        "assistant" => ChatRole::Assistant,
        _ => ChatRole::User,
    }
}

fn chat_tool(tool: &ToolDefinition) -> ChatTool {
    ChatTool {
        type_: "function".to_string(),
        function: ChatToolFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: Some(tool.parameters.clone()),
        },
    }
}

/// Emit the buffered function calls as a single assistant turn.
fn flush_calls(messages: &mut Vec<ChatMessage>, pending: &mut Vec<&InputItem>, inject_tools: bool) {
    if pending.is_empty() {
        return;
    }
    let calls = pending.drain(..).filter_map(|item| match item {
        InputItem::FunctionCall {
            call_id,
            name,
            arguments,
        } => Some((call_id, name, arguments)),
        _ => None,
    });

    if inject_tools {
        let entries: Vec<serde_json::Value> = calls
            .map(|(_, name, arguments)| {
                let arguments = serde_json::from_str::<serde_json::Value>(arguments)
                    .unwrap_or_else(|_| serde_json::Value::String(arguments.clone()));
                serde_json::json!({ "name": name, "arguments": arguments })
            })
            .collect();
        let content = serde_json::json!({ "tool_calls": entries }).to_string();
        messages.push(ChatMessage::text(ChatRole::Assistant, content));
    } else {
        let tool_calls = calls
            .map(|(call_id, name, arguments)| {
                ChatToolCall::function(call_id.clone(), name.clone(), arguments.clone())
            })
            .collect();
        messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        });
    }
}

fn format_tool_result(call_id: &str, name: Option<&str>, output: &str) -> String {
    match name {
        Some(name) => format!("Tool result for call {call_id} ({name}):\n{output}"),
        None => format!("Tool result for call {call_id}:\n{output}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(input: Vec<InputItem>) -> TurnRequest {
        TurnRequest {
            model: "m".into(),
            instructions: None,
            input,
            tools: Vec::new(),
            tool_choice: None,
            stream: false,
            max_output_tokens: None,
            temperature: None,
            top_p: None,
        }
    }

    fn user(text: &str) -> InputItem {
        InputItem::Message {
            role: "user".into(),
            content: text.into(),
        }
    }

    fn call(id: &str, name: &str, args: &str) -> InputItem {
        InputItem::FunctionCall {
            call_id: id.into(),
            name: name.into(),
            arguments: args.into(),
        }
    }

    fn output(id: &str, text: &str) -> InputItem {
        InputItem::FunctionCallOutput {
            call_id: id.into(),
            output: text.into(),
        }
    }

    fn weather_tool() -> ToolDefinition {
        ToolDefinition {
            name: "weather".into(),
            description: Some("Look up weather".into()),
            parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        }
    }

    #[test]
    fn single_string_input_round_trip() {
        let mut req = request(vec![user("hello")]);
        req.instructions = Some("be brief".into());
        let chat = translate_request(&req, &TranslateOptions::default());
        assert_eq!(
            chat.messages,
            vec![
                ChatMessage::text(ChatRole::System, "be brief"),
                ChatMessage::text(ChatRole::User, "hello"),
            ]
        );
        assert!(chat.tools.is_none());
    }

    #[test]
    fn native_replay_keeps_call_ids_and_merges_parallel_calls() {
        let req = request(vec![
            user("go"),
            call("call_a", "ls", "{}"),
            call("call_b", "pwd", r#"{"x":1}"#),
            output("call_a", "file.txt"),
            output("call_b", "/root"),
        ]);
        let chat = translate_request(&req, &TranslateOptions::default());
        assert_eq!(chat.messages.len(), 4);
        let assistant = &chat.messages[1];
        assert_eq!(assistant.role, ChatRole::Assistant);
        assert!(assistant.content.is_none());
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[1].function.arguments, r#"{"x":1}"#);
        assert_eq!(chat.messages[2].role, ChatRole::Tool);
        assert_eq!(chat.messages[2].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(chat.messages[3].content.as_deref(), Some("/root"));
    }

    #[test]
    fn text_mode_injects_prompt_and_renders_history_as_text() {
        let mut req = request(vec![
            user("weather?"),
            call("call_1", "weather", r#"{"city":"Oslo"}"#),
            output("call_1", "rain"),
        ]);
        req.instructions = Some("sys".into());
        req.tools = vec![weather_tool()];
        req.tool_choice = Some(json!("required"));
        let options = TranslateOptions {
            native_tools: false,
            ..TranslateOptions::default()
        };
        let chat = translate_request(&req, &options);

        let system = chat.messages[0].content.as_deref().unwrap();
        assert!(system.starts_with("sys\n\n"));
        assert!(system.contains("<tool name=\"weather\">"));
        assert!(system.contains("You MUST call at least one function."));
        assert!(chat.tools.is_none());
        assert!(chat.tool_choice.is_none());

        let assistant: serde_json::Value =
            serde_json::from_str(chat.messages[2].content.as_deref().unwrap()).unwrap();
        assert_eq!(
            assistant,
            json!({"tool_calls": [{"name": "weather", "arguments": {"city": "Oslo"}}]})
        );
        assert!(chat.messages[2].tool_calls.is_none());

        assert_eq!(chat.messages[3].role, ChatRole::User);
        assert_eq!(
            chat.messages[3].content.as_deref(),
            Some("Tool result for call call_1 (weather):\nrain")
        );
    }

    #[test]
    fn native_mode_forwards_tools_and_choice() {
        let mut req = request(vec![user("x")]);
        req.tools = vec![weather_tool()];
        req.tool_choice = Some(json!({"type": "function", "name": "weather"}));
        req.max_output_tokens = Some(64);
        let chat = translate_request(&req, &TranslateOptions::default());
        let tools = chat.tools.unwrap();
        assert_eq!(tools[0].function.name, "weather");
        assert_eq!(chat.tool_choice, req.tool_choice);
        assert_eq!(chat.max_tokens, Some(64));
    }

    #[test]
    fn empty_or_system_only_history_gets_placeholder_user() {
        let chat = translate_request(&request(Vec::new()), &TranslateOptions::default());
        assert_eq!(
            chat.messages,
            vec![ChatMessage::text(
                ChatRole::User,
                DEFAULT_PLACEHOLDER_USER_MESSAGE
            )]
        );

        let mut req = request(Vec::new());
        req.instructions = Some("only system".into());
        let chat = translate_request(&req, &TranslateOptions::default());
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1].role, ChatRole::User);
    }

    #[test]
    fn developer_role_follows_option() {
        let req = request(vec![InputItem::Message {
            role: "developer".into(),
            content: "rules".into(),
        }]);
        let chat = translate_request(&req, &TranslateOptions::default());
        assert_eq!(chat.messages[0].role, ChatRole::System);
        // Converted developer turn is system-only, so a placeholder follows.
        assert_eq!(chat.messages.len(), 2);

        let options = TranslateOptions {
            convert_developer_to_system: false,
            ..TranslateOptions::default()
        };
        let chat = translate_request(&req, &options);
        assert_eq!(chat.messages[0].role, ChatRole::Developer);
    }

    #[test]
    fn unknown_call_id_result_marker_has_no_name() {
        let options = TranslateOptions {
            native_tools: false,
            ..TranslateOptions::default()
        };
        let mut req = request(vec![output("call_x", "ok")]);
        req.tools = vec![weather_tool()];
        let chat = translate_request(&req, &options);
        assert_eq!(
            chat.messages[1].content.as_deref(),
            Some("Tool result for call call_x:\nok")
        );
    }
}
