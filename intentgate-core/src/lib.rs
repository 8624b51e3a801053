//! IntentGate Core: tool-call gating for AI assistant traffic.
//!
//! Sits between an assistant client and its model backend and decides, before
//! the client sees a response, whether the tool calls it requests may run.
//!
//! ```text
//!  response stream ─▶ stream ─▶ pipeline ─▶ policy ─▶ oracle
//!                                 │           │
//!  request messages ──────────────┘      conversation::trust
//!                                 │
//!                    state (kill-switch), audit (decisions)
//! ```
//!
//! - [`stream`] rebuilds tool calls from chunked event streams
//! - [`conversation`] models messages and computes the trust-scoped view
//! - [`policy`] runs the alignment and provenance checks
//! - [`oracle`] abstracts the yes/no judgment service
//! - [`state`] tracks the externally toggled enabled flag
//! - [`pipeline`] composes the above per intercepted flow
//! - [`audit`] records one decision per evaluated response

pub mod audit;
pub mod config;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod oracle;
pub mod pipeline;
pub mod policy;
pub mod state;
pub mod stream;

pub use error::IntentGateError;
