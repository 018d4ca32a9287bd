//! Conversational operations agent for appointment-based businesses.
//!
//! One inbound chat message becomes exactly one decision: an explicit command
//! match, a deterministic continuation, or a single LLM round-trip that may
//! request one read-only tool. Mutations run through the action executor with
//! fixed reply vocabulary; the model never writes to the store directly.

pub mod actions;
pub mod arbiter;
pub mod commands;
pub mod cooldown;
pub mod decision;
pub mod format;
pub mod heuristics;
pub mod llm;
pub mod providers;
pub mod resolver;
pub mod settings;
pub mod snapshot;
pub mod store;
pub mod tools;

mod runtime;

pub use arbiter::{AgentResponse, Arbiter};
pub use decision::{AgentAction, Decision, ToolRequest};
pub use runtime::AgentRuntime;
pub use store::AgentStore;
