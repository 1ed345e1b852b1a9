//! Assistant runtime: the AI collaborator behind free-text conversations.
//!
//! The model is a writer, never a decider. It drafts a reply and suggests one of a fixed
//! set of actions; the conversation engine owns every state change, and the guardrail
//! policy vets the draft before it reaches the customer:
//!
//! 1. **Prompting** (`prompt`): tenant instructions, knowledge and history become chat
//!    messages with a strict JSON answer contract.
//! 2. **Completion** (`llm`): pluggable `LlmClient`, with an OpenAI-compatible HTTP client.
//! 3. **Parsing** (`reply`): tolerant extraction of `{message, action, confidence}`.
//! 4. **Guardrails** (`guardrails`): prices must come from the catalog, actions need
//!    confidence, replies are bounded.

pub mod guardrails;
pub mod llm;
pub mod prompt;
pub mod reply;
pub mod runtime;

pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::{ChatMessage, ChatRole, HttpLlmClient, LlmClient, LlmError};
pub use runtime::AssistantRuntime;
