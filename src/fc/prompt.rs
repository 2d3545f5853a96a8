use std::fmt::Write as _;

use crate::protocol::turns::ToolDefinition;

/// The literal JSON shape the model must emit to call tools. The extractor in
/// [`super::extract`] accepts exactly this grammar.
pub const TOOL_CALL_FORMAT: &str =
    r#"{"tool_calls":[{"name":"<tool name>","arguments":{<argument object>}}]}"#;

/// How the caller constrained tool use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoiceMode {
    Auto,
    None,
    Required,
    Specific(String),
}

impl ToolChoiceMode {
    /// Interpret an opaque `tool_choice` value. Unknown shapes mean `Auto`.
    #[must_use]
    pub fn from_value(tool_choice: Option<&serde_json::Value>) -> Self {
        let Some(choice) = tool_choice else {
            return ToolChoiceMode::Auto;
        };
        match choice {
            serde_json::Value::String(mode) => match mode.as_str() {
                "none" => ToolChoiceMode::None,
                "required" | "any" => ToolChoiceMode::Required,
                _ => ToolChoiceMode::Auto,
            },
            serde_json::Value::Object(obj) => {
                let name = obj
                    .get("name")
                    .or_else(|| obj.get("function").and_then(|f| f.get("name")))
                    .and_then(serde_json::Value::as_str)
                    .filter(|name| !name.is_empty());
                if let Some(name) = name {
                    return ToolChoiceMode::Specific(name.to_string());
                }
                match obj.get("type").and_then(serde_json::Value::as_str) {
                    Some("none") => ToolChoiceMode::None,
                    Some("required") => ToolChoiceMode::Required,
                    _ => ToolChoiceMode::Auto,
                }
            }
            _ => ToolChoiceMode::Auto,
        }
    }
}

fn format_param_lines(out: &mut String, name: &str, info: &serde_json::Value, required: &[&str]) {
    let p_type = info
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("any");
    let is_required = if required.contains(&name) { "Yes" } else { "No" };
    let _ = write!(out, "\n- {name}:\n  - type: {p_type}\n  - required: {is_required}");
    if let Some(desc) = info.get("description").and_then(serde_json::Value::as_str) {
        let _ = write!(out, "\n  - description: {desc}");
    }
    if let Some(values) = info.get("enum") {
        let _ = write!(out, "\n  - enum: {values}");
    }
    if let Some(default) = info.get("default") {
        let _ = write!(out, "\n  - default: {default}");
    }
    if p_type == "array" {
        if let Some(item_type) = info.get("items").and_then(|items| items.get("type")) {
            let _ = write!(out, "\n  - items.type: {item_type}");
        }
    }
}

/// Render the declared tools as the numbered block inserted into the prompt.
///
/// Schemas are rendered best-effort: a malformed `properties` or `required`
/// is shown as absent rather than rejected.
#[must_use]
pub fn format_tools_list(tools: &[ToolDefinition]) -> String {
    let mut blocks = Vec::with_capacity(tools.len());
    for (i, tool) in tools.iter().enumerate() {
        let props = tool
            .parameters
            .get("properties")
            .and_then(serde_json::Value::as_object);
        let required: Vec<&str> = tool
            .parameters
            .get("required")
            .and_then(serde_json::Value::as_array)
            .map(|arr| arr.iter().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default();

        let description = tool.description.as_deref().unwrap_or("None");
        let mut block = format!(
            "{idx}. <tool name=\"{name}\">\n   Description: {description}\n   Parameter schema: {schema}",
            idx = i + 1,
            name = tool.name,
            schema = tool.parameters,
        );
        match props {
            Some(props) if !props.is_empty() => {
                block.push_str("\n   Parameter details:");
                for (p_name, p_info) in props {
                    format_param_lines(&mut block, p_name, p_info, &required);
                }
            }
            _ => block.push_str("\n   Parameter details: (none)"),
        }
        blocks.push(block);
    }
    blocks.join("\n\n")
}

const DEFAULT_PROMPT_TEMPLATE: &str = r"
You have access to the following tools:

{tools_list}

When you decide to call one or more tools, your reply MUST consist of exactly one JSON object of this form and nothing else:

{tool_call_format}

Rules:
1. `name` must be the exact name of a tool listed above.
2. `arguments` must be a JSON object using the parameter keys exactly as defined.
3. To call several tools at once, put several entries in the same `tool_calls` array.
4. Do not wrap the JSON in prose. A fenced ```json block is tolerated but not required.
5. Results of earlier calls appear in the conversation as user messages starting with `Tool result for call <id>`. Read them before calling a tool again.

If no tool is needed, answer in plain prose and do not emit any JSON object with a `tool_calls` key.
";

/// Build the tool-use instructions appended to the system message when the
/// upstream has no native tool calling.
///
/// A custom template may use the `{tools_list}` and `{tool_call_format}`
/// placeholders.
#[must_use]
pub fn generate_tool_prompt(
    tools: &[ToolDefinition],
    tool_choice: &ToolChoiceMode,
    custom_template: Option<&str>,
) -> String {
    let tools_list = format_tools_list(tools);
    let template = custom_template.unwrap_or(DEFAULT_PROMPT_TEMPLATE);
    let prompt = template
        .replace("{tool_call_format}", TOOL_CALL_FORMAT)
        .replace("{tools_list}", &tools_list);

    match tool_choice {
        ToolChoiceMode::None => format!("{prompt}\n\nDo NOT call any function."),
        ToolChoiceMode::Auto => prompt,
        ToolChoiceMode::Required => format!("{prompt}\n\nYou MUST call at least one function."),
        ToolChoiceMode::Specific(name) => {
            format!("{prompt}\n\nYou MUST call the function: {name}")
        }
    }
}
