//! Command agent for intentdesk
//!
//! Turns a free-text instruction ("swap 0.5 near to usdc") into one
//! orchestrator operation and reports back a readable transcript.
//!
//! # Flow
//!
//! 1. **Interpretation** (`conversation`) - keyword grammar, or an LLM asked for
//!    a JSON command with the keyword grammar as fallback
//! 2. **Guardrails** (`guardrails`) - amount, asset and cap checks
//! 3. **Execution** (`runtime`) - dispatch to the orchestrator, collect progress
//!
//! The LLM only translates text. Amounts, quotes and settlement are decided
//! by `intentdesk-core`.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod runtime;

pub use conversation::{
    AgentCommand, CommandInterpreter, Interpretation, KeywordInterpreter, LlmInterpreter,
};
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::{client_from_config, LlmClient};
pub use runtime::{report_payload, AgentRuntime, CommandReport, CommandStatus, IntentService};
