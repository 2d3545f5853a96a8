pub mod extract;
pub mod prompt;

pub use extract::{extract, extract_with_prose, ExtractedToolCall, Extraction};
pub use prompt::{generate_tool_prompt, ToolChoiceMode, TOOL_CALL_FORMAT};

/// How tool calling reaches the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FcMode {
    /// Tools are forwarded and the upstream emits structured tool-call deltas.
    #[default]
    Native,
    /// Tools are described in the system prompt and calls are recovered from
    /// the reply text.
    Inject,
}

impl FcMode {
    #[must_use]
    pub fn is_native(self) -> bool {
        matches!(self, FcMode::Native)
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "native" => Some(FcMode::Native),
            "inject" | "text" | "prompt" => Some(FcMode::Inject),
            _ => None,
        }
    }
}
