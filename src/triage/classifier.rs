//! Classification call — one LLM invocation deciding sales vs support.
//!
//! The orchestration only enforces the *shape* of the answer: strict JSON,
//! closed category/intent enums, clamped confidence, bounded reasoning.
//! Semantic correctness is the model's problem.

use serde::Deserialize;

use crate::error::TriageError;
use crate::llm::json::extract_json_object;
use crate::llm::LlmProvider;
use crate::triage::types::{
    Category, ClassificationResult, EmailInput, SalesIntent, clamp_score,
};

/// Max tokens for the classification call (kept tight — runs on every email).
const CLASSIFY_MAX_TOKENS: u32 = 512;

/// Static knowledge-base hints handed to the classifier: keyword lists for
/// the two categories plus cue phrases per sales intent. Hints only — the
/// model is told to rely on the email content.
fn knowledge_base_hints() -> serde_json::Value {
    serde_json::json!({
        "sales": [
            "pricing", "quote", "discount", "bundle", "purchase", "buy",
            "trial", "demo", "renewal", "invoice"
        ],
        "support": [
            "error", "bug", "issue", "not working", "down", "broken",
            "failed", "incident", "unable", "crash"
        ],
        "intent_rules": {
            "specific_product_query": [
                "sku", "product code", "looking for", "is available", "availability"
            ],
            "requirement_to_product_suggestion": [
                "recommend", "suggest", "best fit", "need a solution", "requirements"
            ],
            "best_price_offer_or_bundling": [
                "bundle", "best price", "discount", "offer", "package"
            ],
            "need_more_information": [
                "clarify", "need more info", "not sure", "details needed"
            ]
        }
    })
}

/// Build the classification system prompt.
fn build_system_prompt() -> String {
    "You are a strict email classifier for a sales/support organization. \
     Respond with ONLY a JSON object matching this schema:\n\
     {\"category\": \"sales|support|unknown\", \
     \"intent\": \"specific_product_query|requirement_to_product_suggestion|best_price_offer_or_bundling|need_more_information|other\", \
     \"confidence\": number between 0 and 1, \
     \"reasoning\": string (10-1000 characters)}\n\
     Use the provided knowledge base hints, but rely on the email content."
        .to_string()
}

/// Build the classification user prompt.
fn build_user_prompt(email: &EmailInput) -> String {
    let mut prompt = String::with_capacity(512);
    prompt.push_str("KNOWLEDGE BASE HINTS:\n");
    prompt.push_str(&knowledge_base_hints().to_string());
    prompt.push_str("\n\nEMAIL SUBJECT:\n");
    prompt.push_str(email.subject());
    prompt.push_str("\n\nEMAIL BODY:\n");
    prompt.push_str(email.body());
    prompt.push('\n');
    prompt
}

/// Raw model reply, before clamping and constraint checks.
#[derive(Debug, Deserialize)]
struct RawClassification {
    category: Category,
    intent: SalesIntent,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Parse and validate a raw classification reply.
pub fn parse_classification(raw: &str) -> Result<ClassificationResult, TriageError> {
    let json_str = extract_json_object(raw);
    let value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| TriageError::ModelResponse(format!("classification is not JSON: {e}")))?;

    let raw: RawClassification = serde_json::from_value(value).map_err(|e| {
        TriageError::OutputValidation(format!("classification does not match schema: {e}"))
    })?;

    let result = ClassificationResult {
        category: raw.category,
        intent: raw.intent,
        confidence: clamp_score(raw.confidence),
        reasoning: raw.reasoning,
    };
    result
        .validate()
        .map_err(TriageError::OutputValidation)?;
    Ok(result)
}

/// Classify an email. One model call, shape-validated.
pub async fn classify(
    llm: &dyn LlmProvider,
    email: &EmailInput,
) -> Result<ClassificationResult, TriageError> {
    let raw = super::complete(
        llm,
        build_system_prompt(),
        build_user_prompt(email),
        CLASSIFY_MAX_TOKENS,
    )
    .await?;
    parse_classification(&raw)
}
