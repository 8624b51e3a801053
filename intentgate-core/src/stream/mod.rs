//! Tool-call reconstruction from chat-completion event streams.
//!
//! Streamed completions deliver tool calls in fragments:
//!
//! ```text
//! data: {"choices":[{"delta":{"tool_calls":[{"id":"call_1","type":"function","function":{"name":"read_file","arguments":""}}]}}]}
//! data: {"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"{\"pa"}}]}}]}
//! data: {"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"th\":\"a\"}"}}]}}]}
//! data: [DONE]
//! ```
//!
//! This module folds those fragments back into complete [`ToolCall`] values.
//! Everything here is pure: no I/O, no async. A streaming host can feed lines
//! one at a time through [`ToolCallReconstructor::push_line`].
//!
//! # Accumulation rules
//!
//! - At most one accumulator is open at a time.
//! - A fragment whose `id` differs from the open accumulator's id closes it
//!   and opens a new one. The `type` of that fragment sets the kind
//!   (default `"function"`).
//! - A fragment without an id continues the open accumulator, or is dropped
//!   when none is open.
//! - `name` overwrites, `arguments` appends in arrival order.
//! - Malformed payload lines are skipped. They never abort reconstruction.
//!
//! # Limitation
//!
//! Interleaved ids (A, B, A) are not merged: A's second run opens a fresh
//! accumulator and yields a second entry with id A. Providers emit each call
//! as one contiguous run, so this only matters for unusual upstreams.

use serde::Deserialize;
use tracing::{debug, trace};

use crate::conversation::{DEFAULT_TOOL_KIND, FunctionCall, ToolCall};

/// Prefix of every payload-carrying event line.
pub const DATA_PREFIX: &str = "data: ";

/// Terminal sentinel line.
pub const DONE_SENTINEL: &str = "data: [DONE]";

// ─────────────────────────────────────────────────────────────────────────────
// Chunk payload (only the fields reconstruction needs)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Incremental reconstructor
// ─────────────────────────────────────────────────────────────────────────────

/// What [`ToolCallReconstructor::push_line`] did with a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// A well-formed payload was applied (it may have carried no tool calls).
    Payload,
    /// The `data: [DONE]` sentinel.
    Done,
    /// Not a payload line (blank, comment, `event:` field, ...).
    Skipped,
    /// A `data: ` line whose JSON did not parse.
    Malformed,
}

/// Folds stream fragments into finalized tool calls.
#[derive(Debug, Default)]
pub struct ToolCallReconstructor {
    current: Option<ToolCall>,
    finished: Vec<ToolCall>,
    malformed: usize,
}

impl ToolCallReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one event line.
    ///
    /// The line is trimmed before classification, so `\r\n` line endings and
    /// indentation are tolerated.
    pub fn push_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line == DONE_SENTINEL {
            return LineOutcome::Done;
        }
        let Some(json) = line.strip_prefix(DATA_PREFIX) else {
            return LineOutcome::Skipped;
        };

        let payload: ChunkPayload = match serde_json::from_str(json) {
            Ok(p) => p,
            Err(e) => {
                self.malformed += 1;
                debug!(error = %e, "Skipping malformed stream payload");
                return LineOutcome::Malformed;
            }
        };

        for choice in payload.choices {
            let Some(deltas) = choice.delta.and_then(|d| d.tool_calls) else {
                continue;
            };
            for delta in deltas {
                self.apply(delta);
            }
        }
        LineOutcome::Payload
    }

    fn apply(&mut self, delta: ToolCallDelta) {
        let id = delta.id.filter(|id| !id.is_empty());

        if let Some(id) = id {
            let continues = self.current.as_ref().is_some_and(|c| c.id == id);
            if !continues {
                if let Some(done) = self.current.take() {
                    self.finished.push(done);
                }
                trace!(tool_call_id = %id, "Opening tool call accumulator");
                self.current = Some(ToolCall {
                    id,
                    kind: delta
                        .kind
                        .unwrap_or_else(|| DEFAULT_TOOL_KIND.to_string()),
                    function: FunctionCall::default(),
                });
            }
        }

        let Some(current) = self.current.as_mut() else {
            trace!("Dropping tool call fragment with no open accumulator");
            return;
        };
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                current.function.name = name;
            }
            if let Some(fragment) = function.arguments {
                current.function.arguments.push_str(&fragment);
            }
        }
    }

    /// Number of `data: ` lines skipped because their JSON did not parse.
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    /// Closes any open accumulator and returns the calls in first-seen order.
    pub fn finish(mut self) -> Vec<ToolCall> {
        if let Some(done) = self.current.take() {
            self.finished.push(done);
        }
        if self.malformed > 0 {
            debug!(
                malformed_lines = self.malformed,
                tool_calls = self.finished.len(),
                "Reconstruction finished with skipped lines"
            );
        }
        self.finished
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Whole-body helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Reconstructs tool calls from a complete event-stream body.
///
/// An empty body, or one with no `data: ` lines, yields an empty list.
pub fn reconstruct_tool_calls(body: &str) -> Vec<ToolCall> {
    reconstruct_from_lines(body.lines())
}

/// Reconstructs tool calls from a lazily produced sequence of lines.
pub fn reconstruct_from_lines<I>(lines: I) -> Vec<ToolCall>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut reconstructor = ToolCallReconstructor::new();
    for line in lines {
        reconstructor.push_line(line.as_ref());
    }
    reconstructor.finish()
}
