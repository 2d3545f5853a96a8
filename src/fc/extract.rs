//! Recovery of tool-call intent from plain assistant text.
//!
//! Used when the upstream has no native tool calling and was instructed via
//! [`super::prompt`] to answer with `{"tool_calls":[...]}`. Strategies are
//! tried in order and the first one that yields at least one named call wins:
//!
//! 1. the whole trimmed text is the JSON object;
//! 2. the contents of a fenced code block are the JSON object;
//! 3. the first well-formed brace-delimited object with a top-level
//!    `tool_calls` key, found anywhere in the text.
//!
//! Reasoning blocks (`<think>` and friends) are removed before any strategy
//! runs so that drafts inside them are never executed.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use memchr::{memchr, memmem};
use serde_json::Value;

use crate::json_scan::objects_with_key;

const TOOL_CALLS_KEY: &str = "tool_calls";

const REASONING_TAGS: [&str; 4] = ["think", "thinking", "reasoning", "analysis"];

static FENCED_BLOCK: LazyLock<Option<regex_lite::Regex>> = LazyLock::new(|| {
    regex_lite::Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").ok()
});

/// A tool call recovered from text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedToolCall {
    pub name: String,
    /// Always a JSON value; undecodable string arguments become
    /// `{"raw": <string>}`.
    pub arguments: Value,
}

impl ExtractedToolCall {
    /// Arguments re-serialized as the JSON text carried by function-call items.
    #[must_use]
    pub fn arguments_json(&self) -> String {
        self.arguments.to_string()
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub calls: Vec<ExtractedToolCall>,
    /// Text outside the matched JSON, trimmed. Empty when the whole reply was
    /// the tool-call object.
    pub prose: String,
}

/// Extract tool calls from `raw_text`. `None` means a plain answer.
#[must_use]
pub fn extract(raw_text: &str) -> Option<Vec<ExtractedToolCall>> {
    extract_with_prose(raw_text).map(|extraction| extraction.calls)
}

/// Like [`extract`], also returning the prose that surrounded the JSON.
#[must_use]
pub fn extract_with_prose(raw_text: &str) -> Option<Extraction> {
    let cleaned = remove_reasoning_blocks(raw_text);
    let text = cleaned.as_ref();
    if memmem::find(text.as_bytes(), TOOL_CALLS_KEY.as_bytes()).is_none() {
        return None;
    }

    let trimmed = text.trim();
    if let Some(calls) = calls_from_str(trimmed) {
        return Some(Extraction {
            calls,
            prose: String::new(),
        });
    }

    let fenced = FENCED_BLOCK.as_ref().into_iter();
    for caps in fenced.flat_map(|re| re.captures_iter(text)) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some(calls) = calls_from_str(body.as_str().trim()) {
            return Some(Extraction {
                calls,
                prose: prose_without(text, whole.range()),
            });
        }
    }

    for range in objects_with_key(text.as_bytes(), TOOL_CALLS_KEY.as_bytes()) {
        if let Some(calls) = text.get(range.clone()).and_then(calls_from_str) {
            return Some(Extraction {
                calls,
                prose: prose_without(text, range),
            });
        }
    }

    None
}

fn prose_without(text: &str, range: Range<usize>) -> String {
    let before = text[..range.start].trim_end();
    let after = text[range.end..].trim_start();
    match (before.is_empty(), after.is_empty()) {
        (true, true) => String::new(),
        (false, true) => before.trim_start().to_string(),
        (true, false) => after.trim_end().to_string(),
        (false, false) => format!("{}\n\n{}", before.trim_start(), after.trim_end()),
    }
}

fn calls_from_str(candidate: &str) -> Option<Vec<ExtractedToolCall>> {
    if !candidate.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(candidate).ok()?;
    calls_from_value(value)
}

fn calls_from_value(value: Value) -> Option<Vec<ExtractedToolCall>> {
    let Value::Object(mut root) = value else {
        return None;
    };
    let Some(Value::Array(entries)) = root.remove(TOOL_CALLS_KEY) else {
        return None;
    };

    let calls: Vec<ExtractedToolCall> = entries.into_iter().filter_map(call_from_entry).collect();
    if calls.is_empty() {
        None
    } else {
        Some(calls)
    }
}

fn call_from_entry(entry: Value) -> Option<ExtractedToolCall> {
    let Value::Object(mut entry) = entry else {
        return None;
    };
    // Also accept the chat shape {"function": {"name", "arguments"}}.
    if let Some(Value::Object(function)) = entry.remove("function") {
        for (key, value) in function {
            entry.entry(key).or_insert(value);
        }
    }
    let name = match entry.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => return None,
    };
    let arguments = match entry.remove("arguments").or_else(|| entry.remove("parameters")) {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(Value::String(s)) => decode_string_arguments(s),
        Some(other) => other,
    };
    Some(ExtractedToolCall { name, arguments })
}

fn decode_string_arguments(s: String) -> Value {
    if s.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    match serde_json::from_str::<Value>(&s) {
        Ok(value) => value,
        Err(_) => serde_json::json!({ "raw": s }),
    }
}

/// Remove reasoning blocks, including nested ones. An unterminated block is
/// kept verbatim.
pub(crate) fn remove_reasoning_blocks(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    if memchr(b'<', bytes).is_none() || !REASONING_TAGS.iter().any(|tag| open_tag_at_any(text, tag)) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    let mut depth = 0usize;
    let mut block_start = 0usize;

    while let Some(rel) = memchr(b'<', &bytes[cursor..]) {
        let at = cursor + rel;
        if depth == 0 {
            out.push_str(&text[cursor..at]);
        }
        let rest = &text[at..];
        if let Some(len) = tag_len(rest, false) {
            if depth == 0 {
                block_start = at;
            }
            depth += 1;
            cursor = at + len;
        } else if let (Some(len), true) = (tag_len(rest, true), depth > 0) {
            depth -= 1;
            cursor = at + len;
        } else {
            if depth == 0 {
                out.push('<');
            }
            cursor = at + 1;
        }
    }

    if depth > 0 {
        out.push_str(&text[block_start..]);
    } else {
        out.push_str(&text[cursor..]);
    }
    Cow::Owned(out)
}

fn open_tag_at_any(text: &str, tag: &str) -> bool {
    let needle = format!("<{tag}>");
    memmem::find(text.as_bytes(), needle.as_bytes()).is_some()
}

fn tag_len(rest: &str, closing: bool) -> Option<usize> {
    let inner = if closing {
        rest.strip_prefix("</")?
    } else {
        rest.strip_prefix('<')?
    };
    REASONING_TAGS.iter().find_map(|tag| {
        let after = inner.strip_prefix(tag)?;
        after
            .starts_with('>')
            .then(|| rest.len() - after.len() + 1)
    })
}
