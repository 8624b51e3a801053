//! Synthetic completion returned in place of a blocked response.
//!
//! The client receives a well-formed, non-streamed chat completion that
//! explains the block instead of a transport error, so the assistant UI shows
//! the reason and the conversation can continue.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

/// `id` of every synthetic completion.
pub const BLOCKED_COMPLETION_ID: &str = "intentgate-blocked";

/// `model` of every synthetic completion.
pub const BLOCKED_COMPLETION_MODEL: &str = "intentgate";

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Replacement for a blocked response.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockingResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Value,
}

impl BlockingResponse {
    pub fn new(reason: &str, now: DateTime<Utc>) -> Self {
        Self {
            status: 200,
            content_type: CONTENT_TYPE_JSON,
            body: blocked_completion(reason, now),
        }
    }

    /// Serialized body bytes.
    pub fn body_bytes(&self) -> Vec<u8> {
        self.body.to_string().into_bytes()
    }
}

/// Builds the chat-completion JSON for a blocked tool call.
pub fn blocked_completion(reason: &str, now: DateTime<Utc>) -> Value {
    json!({
        "id": BLOCKED_COMPLETION_ID,
        "object": "chat.completion",
        "created": now.timestamp(),
        "model": BLOCKED_COMPLETION_MODEL,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": format!(
                    "Tool call blocked by IntentGate: it did not pass the security check.\n\nReason: {}",
                    reason
                ),
            },
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": 0,
            "completion_tokens": 0,
            "total_tokens": 0,
        },
    })
}
