use serde_json::Value;

use crate::error::BridgeError;

use super::{InputItem, ToolDefinition, TurnRequest, TurnRequestWire};

/// Decode a raw turn request body.
///
/// `default_model` is used when the caller omits `model`.
///
/// # Errors
///
/// Returns [`BridgeError::MalformedInput`] when the body is not a JSON object,
/// when `input` is neither a string nor an array, or when an input item is
/// structurally unusable (non-object entry, function call without a name or
/// call id).
pub fn decode_turn_request(body: &[u8], default_model: &str) -> Result<TurnRequest, BridgeError> {
    let wire: TurnRequestWire = serde_json::from_slice(body)
        .map_err(|e| BridgeError::MalformedInput(format!("Invalid JSON body: {e}")))?;
    decode_turn_request_wire(wire, default_model)
}

/// Normalize an already-deserialized wire request.
///
/// # Errors
///
/// See [`decode_turn_request`].
pub fn decode_turn_request_wire(
    wire: TurnRequestWire,
    default_model: &str,
) -> Result<TurnRequest, BridgeError> {
    let TurnRequestWire {
        model,
        input,
        instructions,
        tools,
        tool_choice,
        stream,
        temperature,
        max_output_tokens,
        top_p,
    } = wire;

    let input = match input {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => decode_input(value)?,
    };

    Ok(TurnRequest {
        model: model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_model.to_string()),
        instructions: instructions.filter(|s| !s.is_empty()),
        input,
        tools: decode_tools(tools.unwrap_or_default()),
        tool_choice: tool_choice.filter(|v| !v.is_null()),
        stream: stream.unwrap_or(false),
        max_output_tokens,
        temperature,
        top_p,
    })
}

fn decode_input(input: Value) -> Result<Vec<InputItem>, BridgeError> {
    match input {
        Value::String(s) => Ok(vec![InputItem::Message {
            role: "user".to_string(),
            content: s,
        }]),
        Value::Array(items) => {
            let mut decoded = Vec::with_capacity(items.len());
            for (idx, item) in items.into_iter().enumerate() {
                if let Some(item) = decode_input_item(item, idx)? {
                    decoded.push(item);
                }
            }
            Ok(decoded)
        }
        _ => Err(BridgeError::MalformedInput(
            "`input` must be a string or an array".into(),
        )),
    }
}

fn decode_input_item(item: Value, idx: usize) -> Result<Option<InputItem>, BridgeError> {
    let mut obj = match item {
        Value::String(s) => {
            return Ok(Some(InputItem::Message {
                role: "user".to_string(),
                content: s,
            }))
        }
        Value::Object(obj) => obj,
        _ => {
            return Err(BridgeError::MalformedInput(format!(
                "input[{idx}] must be an object or a string"
            )))
        }
    };

    let item_type = match obj.remove("type") {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };

    match item_type.as_deref() {
        Some("function_call") => {
            let call_id = take_string(&mut obj, "call_id")
                .or_else(|| take_string(&mut obj, "id"))
                .ok_or_else(|| {
                    BridgeError::MalformedInput(format!("input[{idx}]: function_call without call_id"))
                })?;
            let name = take_string(&mut obj, "name").ok_or_else(|| {
                BridgeError::MalformedInput(format!("input[{idx}]: function_call without name"))
            })?;
            let arguments = match obj.remove("arguments") {
                Some(Value::String(s)) if !s.trim().is_empty() => s,
                Some(v @ (Value::Object(_) | Value::Array(_))) => v.to_string(),
                _ => "{}".to_string(),
            };
            Ok(Some(InputItem::FunctionCall {
                call_id,
                name,
                arguments,
            }))
        }
        Some("function_call_output") => {
            let call_id = take_string(&mut obj, "call_id").ok_or_else(|| {
                BridgeError::MalformedInput(format!(
                    "input[{idx}]: function_call_output without call_id"
                ))
            })?;
            let output = match obj.remove("output") {
                Some(Value::String(s)) => s,
                None | Some(Value::Null) => String::new(),
                Some(other) => other.to_string(),
            };
            Ok(Some(InputItem::FunctionCallOutput { call_id, output }))
        }
        Some("message") | None => {
            let Some(role) = take_string(&mut obj, "role") else {
                if item_type.is_some() {
                    return Ok(Some(InputItem::Message {
                        role: "user".to_string(),
                        content: flatten_content(obj.remove("content"), idx)?,
                    }));
                }
                tracing::debug!("skipping input[{idx}]: no type and no role");
                return Ok(None);
            };
            Ok(Some(InputItem::Message {
                role,
                content: flatten_content(obj.remove("content"), idx)?,
            }))
        }
        Some(other) => {
            tracing::debug!("skipping input[{idx}] of unsupported type '{other}'");
            Ok(None)
        }
    }
}

/// Flatten message content to plain text; array segments are concatenated
/// and segments without text are dropped.
fn flatten_content(content: Option<Value>, idx: usize) -> Result<String, BridgeError> {
    match content {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Array(parts)) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    Value::String(s) => out.push_str(&s),
                    Value::Object(mut part) => {
                        if let Some(text) = take_string(&mut part, "text")
                            .or_else(|| take_string(&mut part, "content"))
                        {
                            out.push_str(&text);
                        }
                    }
                    _ => {}
                }
            }
            Ok(out)
        }
        Some(_) => Err(BridgeError::MalformedInput(format!(
            "input[{idx}].content must be a string or an array"
        ))),
    }
}

fn decode_tools(tools: Vec<Value>) -> Vec<ToolDefinition> {
    let mut decoded = Vec::with_capacity(tools.len());
    for tool in tools {
        let Value::Object(mut obj) = tool else {
            continue;
        };
        let tool_type = obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("function")
            .to_string();
        if tool_type != "function" {
            tracing::debug!("dropping non-function tool '{tool_type}'");
            continue;
        }
        // Nested chat form: {type: function, function: {name, ...}}.
        if let Some(Value::Object(inner)) = obj.remove("function") {
            obj = inner;
        }
        let Some(name) = take_string(&mut obj, "name").filter(|n| !n.is_empty()) else {
            tracing::debug!("dropping function tool without a name");
            continue;
        };
        let parameters = match obj.remove("parameters") {
            Some(v @ Value::Object(_)) => v,
            _ => serde_json::json!({"type": "object", "properties": {}}),
        };
        decoded.push(ToolDefinition {
            name,
            description: take_string(&mut obj, "description").filter(|d| !d.is_empty()),
            parameters,
        });
    }
    decoded
}

#[inline]
fn take_string(obj: &mut serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match obj.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Result<TurnRequest, BridgeError> {
        decode_turn_request(value.to_string().as_bytes(), "default-model")
    }

    #[test]
    fn string_input_becomes_single_user_message() {
        let req = decode(json!({"model": "m", "input": "hello"})).unwrap();
        assert_eq!(req.model, "m");
        assert!(!req.stream);
        assert_eq!(
            req.input,
            vec![InputItem::Message {
                role: "user".into(),
                content: "hello".into()
            }]
        );
    }

    #[test]
    fn missing_model_uses_default() {
        let req = decode(json!({"input": "x"})).unwrap();
        assert_eq!(req.model, "default-model");
    }

    #[test]
    fn content_array_is_concatenated_and_non_text_dropped() {
        let req = decode(json!({
            "input": [{
                "type": "message",
                "role": "user",
                "content": [
                    {"type": "input_text", "text": "a"},
                    {"type": "input_image", "image_url": "http://x"},
                    {"type": "input_text", "text": "b"}
                ]
            }]
        }))
        .unwrap();
        assert_eq!(
            req.input,
            vec![InputItem::Message {
                role: "user".into(),
                content: "ab".into()
            }]
        );
    }

    #[test]
    fn function_call_items_fall_back_to_id_and_default_arguments() {
        let req = decode(json!({
            "input": [
                {"type": "function_call", "id": "fc_9", "name": "ls"},
                {"type": "function_call_output", "call_id": "fc_9", "output": {"files": 2}}
            ]
        }))
        .unwrap();
        assert_eq!(
            req.input[0],
            InputItem::FunctionCall {
                call_id: "fc_9".into(),
                name: "ls".into(),
                arguments: "{}".into()
            }
        );
        assert_eq!(
            req.input[1],
            InputItem::FunctionCallOutput {
                call_id: "fc_9".into(),
                output: r#"{"files":2}"#.into()
            }
        );
    }

    #[test]
    fn unknown_items_are_skipped() {
        let req = decode(json!({
            "input": [{"type": "reasoning", "summary": []}, "hi"]
        }))
        .unwrap();
        assert_eq!(req.input.len(), 1);
    }

    #[test]
    fn structurally_invalid_input_is_rejected() {
        assert!(matches!(
            decode(json!({"input": 42})),
            Err(BridgeError::MalformedInput(_))
        ));
        assert!(matches!(
            decode(json!({"input": [7]})),
            Err(BridgeError::MalformedInput(_))
        ));
        assert!(matches!(
            decode_turn_request(b"not json", "m"),
            Err(BridgeError::MalformedInput(_))
        ));
    }

    #[test]
    fn tools_accept_flat_and_nested_forms_and_drop_builtins() {
        let req = decode(json!({
            "input": "x",
            "tools": [
                {"type": "function", "name": "a", "parameters": {"type": "object"}},
                {"type": "function", "function": {"name": "b", "description": "bee"}},
                {"type": "web_search"}
            ]
        }))
        .unwrap();
        assert_eq!(req.tools.len(), 2);
        assert_eq!(req.tools[0].name, "a");
        assert_eq!(req.tools[1].name, "b");
        assert_eq!(req.tools[1].description.as_deref(), Some("bee"));
        assert_eq!(req.tools[1].parameters["type"], "object");
    }
}
