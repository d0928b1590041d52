//! The triage pipeline — validate → classify → route → workflow → finalize.
//!
//! Flow per run:
//! 1. Field validation + injection guardrails (no LLM)
//! 2. Classification call → structured category/intent/confidence
//! 3. Router → sales, support, or unknown workflow
//! 4. Workflow: ticket persistence + enrichment calls
//! 5. Finalizer re-validates the assembled response

pub mod classifier;
pub mod intent;
pub mod runner;
pub mod sales;
pub mod support;
pub mod types;

pub use runner::{TriageRunner, WorkflowKind, route};

use crate::error::TriageError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Sampling temperature for all triage calls (deterministic-ish).
const TRIAGE_TEMPERATURE: f32 = 0.0;

/// Run one completion and return its text content.
pub(crate) async fn complete(
    llm: &dyn LlmProvider,
    system_prompt: String,
    user_prompt: String,
    max_tokens: u32,
) -> Result<String, TriageError> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(user_prompt),
    ])
    .with_temperature(TRIAGE_TEMPERATURE)
    .with_max_tokens(max_tokens);

    let response = llm.complete(request).await?;
    Ok(response.content)
}
