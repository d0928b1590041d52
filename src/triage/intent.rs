//! Intent-detail extraction — the second LLM call shared by both workflows.
//!
//! Pulls product mentions, need keywords, bundle/more-info flags, follow-up
//! questions, and troubleshooting context out of the email. Lenient by
//! design: missing fields default, lists are truncated to fixed caps, and an
//! unrecognized urgency falls back to medium.

use serde::Deserialize;

use crate::error::TriageError;
use crate::llm::LlmProvider;
use crate::llm::json::extract_json_object;
use crate::triage::types::{ClassificationResult, EmailInput, Urgency};

/// Max tokens for the extraction call.
const INTENT_MAX_TOKENS: u32 = 512;

/// Cap for mention/keyword/symptom/hint lists.
const MAX_LIST_ITEMS: usize = 8;
/// Cap for follow-up question lists.
const MAX_FOLLOW_UPS: usize = 6;

/// Extracted intent details, lists already truncated.
#[derive(Debug, Clone, Default)]
pub struct IntentDetails {
    pub mentions: Vec<String>,
    pub need_keywords: Vec<String>,
    pub wants_bundles: bool,
    pub needs_more_info: bool,
    pub follow_up_questions: Vec<String>,
    pub support_symptoms: Vec<String>,
    pub environment_hints: Vec<String>,
    pub urgency: Urgency,
}

fn build_system_prompt() -> String {
    "You extract intent details from a customer email. \
     Respond with ONLY a JSON object:\n\
     {\"mentions\": [\"...\"], \
     \"need_keywords\": [\"...\"], \
     \"wants_bundles\": true|false, \
     \"needs_more_info\": true|false, \
     \"follow_up_questions\": [\"...\"], \
     \"support_symptoms\": [\"...\"], \
     \"environment_hints\": [\"...\"], \
     \"urgency\": \"low|medium|high\"}\n\
     Keep arrays short (max 8 items)."
        .to_string()
}

fn build_user_prompt(email: &EmailInput, classification: &ClassificationResult) -> String {
    let classification_json = serde_json::to_string(classification)
        .unwrap_or_else(|_| "{}".to_string());

    let mut prompt = String::with_capacity(512);
    prompt.push_str("EMAIL SUBJECT:\n");
    prompt.push_str(email.subject());
    prompt.push_str("\n\nEMAIL BODY:\n");
    prompt.push_str(email.body());
    prompt.push_str("\n\nCLASSIFICATION:\n");
    prompt.push_str(&classification_json);
    prompt.push('\n');
    prompt
}

#[derive(Debug, Deserialize)]
struct RawIntentDetails {
    #[serde(default)]
    mentions: Vec<String>,
    #[serde(default)]
    need_keywords: Vec<String>,
    #[serde(default)]
    wants_bundles: bool,
    #[serde(default)]
    needs_more_info: bool,
    #[serde(default)]
    follow_up_questions: Vec<String>,
    #[serde(default)]
    support_symptoms: Vec<String>,
    #[serde(default)]
    environment_hints: Vec<String>,
    #[serde(default)]
    urgency: String,
}

fn cap(mut list: Vec<String>, max: usize) -> Vec<String> {
    list.truncate(max);
    list
}

/// Parse a raw extraction reply into truncated details.
pub fn parse_intent_details(raw: &str) -> Result<IntentDetails, TriageError> {
    let json_str = extract_json_object(raw);
    let value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| TriageError::ModelResponse(format!("intent details are not JSON: {e}")))?;

    let raw: RawIntentDetails = serde_json::from_value(value).map_err(|e| {
        TriageError::ModelResponse(format!("intent details do not match schema: {e}"))
    })?;

    let urgency = match raw.urgency.to_lowercase().as_str() {
        "low" => Urgency::Low,
        "high" => Urgency::High,
        _ => Urgency::Medium,
    };

    Ok(IntentDetails {
        mentions: cap(raw.mentions, MAX_LIST_ITEMS),
        need_keywords: cap(raw.need_keywords, MAX_LIST_ITEMS),
        wants_bundles: raw.wants_bundles,
        needs_more_info: raw.needs_more_info,
        follow_up_questions: cap(raw.follow_up_questions, MAX_FOLLOW_UPS),
        support_symptoms: cap(raw.support_symptoms, MAX_LIST_ITEMS),
        environment_hints: cap(raw.environment_hints, MAX_LIST_ITEMS),
        urgency,
    })
}

/// Extract intent details from an email. One model call.
pub async fn extract_details(
    llm: &dyn LlmProvider,
    email: &EmailInput,
    classification: &ClassificationResult,
) -> Result<IntentDetails, TriageError> {
    let raw = super::complete(
        llm,
        build_system_prompt(),
        build_user_prompt(email, classification),
        INTENT_MAX_TOKENS,
    )
    .await?;
    parse_intent_details(&raw)
}
