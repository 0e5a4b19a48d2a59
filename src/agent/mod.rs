//! Agent Orchestration
//!
//! The think -> act -> observe cycle for one user message, and the LLM
//! provider client it prompts through.

pub mod agent_loop;
pub mod llm;

pub use agent_loop::{MessageOpts, Persona, ToolAgent, MAX_PROMPTS};
