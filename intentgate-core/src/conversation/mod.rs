//! Conversation model shared by the reconstructor, the trust view and the
//! policy evaluator.
//!
//! Messages follow the OpenAI chat-completions wire shape:
//!
//! ```text
//! { "role": "assistant",
//!   "content": null,
//!   "tool_calls": [ { "id": "call_1", "type": "function",
//!                     "function": { "name": "read_file", "arguments": "{...}" } } ] }
//! { "role": "tool", "tool_call_id": "call_1", "content": "..." }
//! ```
//!
//! Unknown fields are ignored. `content` may be a plain string, `null`, or an
//! array of `{ "type": "text", "text": ... }` parts, which are concatenated.

pub mod trust;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use trust::{TrustSet, TrustedView};

/// Kind tag used when a tool call does not state one.
pub const DEFAULT_TOOL_KIND: &str = "function";

// ─────────────────────────────────────────────────────────────────────────────
// Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Author of a message.
///
/// Roles outside the four the gate reasons about (for example `developer`)
/// deserialize to [`Role::Other`]; they are never user-authored and never
/// part of a trusted view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    #[serde(other)]
    Other,
}

impl Role {
    /// Returns the wire token for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Other => "other",
        }
    }
}

/// Function half of a tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    /// Opaque argument text. Not required to be valid JSON.
    #[serde(default, deserialize_with = "deserialize_arguments")]
    pub arguments: String,
}

/// A tool invocation requested by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub function: FunctionCall,
}

fn default_kind() -> String {
    DEFAULT_TOOL_KIND.to_string()
}

impl ToolCall {
    /// Creates a `function` tool call.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: default_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn arguments(&self) -> &str {
        &self.function.arguments
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set only on `tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant turn with no content that requests the given tool calls.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Tool result answering `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Content text, or `""` when absent.
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered conversation history. Insertion order is conversation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    messages: Vec<Message>,
}

impl Context {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Appends a message. Existing messages are never reordered or removed.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tool calls of the most recent assistant message that carries a
    /// `tool_calls` list.
    ///
    /// Returns `None` when no assistant message has one. An explicitly empty
    /// list is returned as `Some(&[])`.
    pub fn last_tool_calls(&self) -> Option<&[ToolCall]> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .find_map(|m| m.tool_calls.as_deref())
    }

    /// Messages authored by the user, in order.
    pub fn user_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::User)
    }

    /// Builds the trust-scoped view of this conversation.
    pub fn trusted_view<'a>(&'a self, trust: &TrustSet) -> TrustedView<'a> {
        TrustedView::build(&self.messages, trust)
    }
}

impl From<Vec<Message>> for Context {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire helpers
// ─────────────────────────────────────────────────────────────────────────────

fn deserialize_content<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Array(parts)) => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            Some(text.concat())
        }
        Some(other) => Some(other.to_string()),
    })
}

fn deserialize_arguments<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        // Some providers send arguments as an object rather than a string.
        Some(other) => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_deserializes_openai_shape() {
        let msg: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "read_file", "arguments": "{\"path\":\"a\"}"}
            }],
            "refusal": null
        }))
        .unwrap();

        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_none());
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name(), "read_file");
        assert_eq!(calls[0].arguments(), "{\"path\":\"a\"}");
    }

    #[test]
    fn test_content_parts_are_concatenated() {
        let msg: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "<userPrompt>fix "},
                {"type": "image_url", "image_url": {"url": "x"}},
                {"type": "text", "text": "the bug</userPrompt>"}
            ]
        }))
        .unwrap();
        assert_eq!(msg.content_str(), "<userPrompt>fix the bug</userPrompt>");
    }

    #[test]
    fn test_unknown_role_maps_to_other() {
        let msg: Message =
            serde_json::from_value(json!({"role": "developer", "content": "hi"})).unwrap();
        assert_eq!(msg.role, Role::Other);
    }

    #[test]
    fn test_tool_call_kind_defaults_to_function() {
        let call: ToolCall =
            serde_json::from_value(json!({"id": "c", "function": {"name": "n"}})).unwrap();
        assert_eq!(call.kind, "function");
        assert_eq!(call.arguments(), "");
    }

    #[test]
    fn test_object_arguments_are_stringified() {
        let call: ToolCall = serde_json::from_value(json!({
            "id": "c",
            "function": {"name": "n", "arguments": {"q": 1}}
        }))
        .unwrap();
        assert_eq!(call.arguments(), "{\"q\":1}");
    }

    #[test]
    fn test_last_tool_calls_picks_most_recent_assistant() {
        let ctx = Context::new(vec![
            Message::user("hi"),
            Message::assistant_tool_calls(vec![ToolCall::new("a", "first", "{}")]),
            Message::tool("a", "result"),
            Message::assistant("thinking"),
            Message::assistant_tool_calls(vec![ToolCall::new("b", "second", "{}")]),
            Message::user("later"),
        ]);
        let calls = ctx.last_tool_calls().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name(), "second");
    }

    #[test]
    fn test_last_tool_calls_none_without_assistant_calls() {
        let ctx = Context::new(vec![Message::user("hi"), Message::assistant("hello")]);
        assert!(ctx.last_tool_calls().is_none());
    }

    #[test]
    fn test_serialized_assistant_keeps_null_content() {
        let msg = Message::assistant_tool_calls(vec![ToolCall::new("a", "t", "{}")]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["content"], Value::Null);
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert!(value.get("tool_call_id").is_none());
    }
}
