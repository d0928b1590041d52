//! Sales workflow — ticket logging plus model-driven enrichment.
//!
//! The ticket row is committed before any enrichment call and is never
//! rolled back: a later model failure still leaves the request logged.
//! Branching over the classified intent is an exhaustive match on the
//! closed `SalesIntent` enum.

use serde::de::DeserializeOwned;

use crate::error::TriageError;
use crate::events::RunEmitter;
use crate::llm::LlmProvider;
use crate::llm::json::extract_json_array;
use crate::store::{Database, NewTicket};
use crate::triage::intent::{self, IntentDetails};
use crate::triage::types::{
    BundleOption, Category, ClassificationResult, EmailInput, FinalAgentResponse, Product,
    ProductRecommendation, SalesIntent, SalesWorkflowResult, TicketKind, clamp_score,
    new_ticket_id,
};

/// Recommendation cap per reply.
const MAX_RECOMMENDATIONS: usize = 5;
/// Bundles requested from the model; the reply may carry fewer valid items.
const BUNDLE_COUNT: usize = 5;
/// Row cap for the keyword candidate search.
const KEYWORD_SEARCH_LIMIT: usize = 10;
/// Max tokens for recommendation/bundle calls.
const ENRICHMENT_MAX_TOKENS: u32 = 1024;

/// Fallback questions when more info is needed but none were extracted.
fn default_follow_up_questions() -> Vec<String> {
    vec![
        "Which product category are you most interested in (CRM, Support Desk, Analytics, etc.)?"
            .to_string(),
        "How many users/seats do you need and what is your target budget range?".to_string(),
        "Are there must-have features (SLA, automation, dashboards, integrations)?".to_string(),
    ]
}

// ── Prompts ─────────────────────────────────────────────────────────

fn recommend_system_prompt() -> String {
    "You are a product recommendation engine. Respond with ONLY a JSON array. \
     Each item must have: sku, name, purpose, price_usd, score (0..1), \
     reasoning (10-800 characters). Rank best first. Provide 1-5 items."
        .to_string()
}

fn recommend_user_prompt(needs: &str, products: &[Product]) -> String {
    format!(
        "CUSTOMER NEEDS:\n{needs}\n\nAVAILABLE PRODUCTS:\n{}\n",
        products_json(products)
    )
}

fn bundle_system_prompt() -> String {
    format!(
        "You create bundle options. Respond with ONLY a JSON array. \
         Each item: name, items (array of SKUs or product names, 1-6 entries), \
         total_price_usd, score (0..1), reasoning (10-800 characters). \
         Return exactly {BUNDLE_COUNT} items."
    )
}

fn bundle_user_prompt(context: &str, products: &[Product]) -> String {
    format!(
        "CUSTOMER CONTEXT:\n{context}\n\nAVAILABLE ACTIVE PRODUCTS:\n{}\n\
         Bundling guidance: keep bundles realistic and price-sensitive.",
        products_json(products)
    )
}

fn products_json(products: &[Product]) -> String {
    serde_json::to_string(products).unwrap_or_else(|_| "[]".to_string())
}

// ── Reply parsing ───────────────────────────────────────────────────

/// Parse a JSON-array model reply into at most `max` validated items,
/// clamping each item's score before the typed parse.
fn parse_scored_items<T, F>(
    raw: &str,
    what: &str,
    max: usize,
    validate: F,
) -> Result<Vec<T>, TriageError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Result<(), String>,
{
    let json_str = extract_json_array(raw);
    let value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| TriageError::ModelResponse(format!("{what} reply is not JSON: {e}")))?;

    let serde_json::Value::Array(items) = value else {
        return Err(TriageError::ModelResponse(format!(
            "{what} reply is not a JSON array"
        )));
    };

    let mut parsed = Vec::with_capacity(max.min(items.len()));
    for mut item in items.into_iter().take(max) {
        if let Some(object) = item.as_object_mut() {
            let score = object.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
            object.insert("score".to_string(), serde_json::json!(clamp_score(score)));
        }
        let typed: T = serde_json::from_value(item).map_err(|e| {
            TriageError::OutputValidation(format!("{what} item does not match schema: {e}"))
        })?;
        validate(&typed).map_err(TriageError::OutputValidation)?;
        parsed.push(typed);
    }
    Ok(parsed)
}

/// Parse a recommendation reply: at most 5 items, clamped scores.
pub fn parse_recommendations(raw: &str) -> Result<Vec<ProductRecommendation>, TriageError> {
    parse_scored_items(raw, "recommendation", MAX_RECOMMENDATIONS, |item: &ProductRecommendation| {
        item.validate()
    })
}

/// Parse a bundle reply: at most 5 items, clamped scores, sorted ascending
/// by total price.
pub fn parse_bundles(raw: &str) -> Result<Vec<BundleOption>, TriageError> {
    let mut bundles =
        parse_scored_items(raw, "bundle", BUNDLE_COUNT, |item: &BundleOption| item.validate())?;
    bundles.sort_by(|a, b| a.total_price_usd.cmp(&b.total_price_usd));
    Ok(bundles)
}

// ── Workflow ────────────────────────────────────────────────────────

/// Run the sales workflow and assemble the final response.
pub async fn run_sales_workflow(
    llm: &dyn LlmProvider,
    store: &dyn Database,
    emitter: &RunEmitter,
    email: &EmailInput,
    classification: &ClassificationResult,
) -> Result<FinalAgentResponse, TriageError> {
    emitter
        .status("sales", "Starting sales workflow: logging ticket...", 45)
        .await;

    let ticket_id = new_ticket_id(TicketKind::Sales);
    store
        .insert_sales_ticket(&NewTicket {
            ticket_id: &ticket_id,
            email_subject: email.subject(),
            email_body: email.body(),
            attachments: email.attachments(),
            classification,
        })
        .await?;
    emitter
        .status("sales", format!("Sales ticket created: {ticket_id}"), 55)
        .await;

    emitter
        .status("sales", "Extracting intent details from email...", 60)
        .await;
    let details = intent::extract_details(llm, email, classification).await?;

    let mut recommendations: Vec<ProductRecommendation> = Vec::new();
    let mut bundles: Vec<BundleOption> = Vec::new();
    let mut follow_up_questions = details.follow_up_questions.clone();
    let mut needs_more_info = details.needs_more_info;
    let mut message_to_rep = String::new();

    match classification.intent {
        SalesIntent::SpecificProductQuery => {
            emitter
                .status(
                    "sales",
                    "Searching product database for mentioned products...",
                    70,
                )
                .await;
            let found = store.search_products_by_mention(&details.mentions).await?;
            if found.is_empty() {
                message_to_rep = format!(
                    "Ticket {ticket_id} logged. The mentioned product was not found in the \
                     product database. It may be discontinued or named differently."
                );
            } else {
                let (active, inactive): (Vec<Product>, Vec<Product>) =
                    found.into_iter().partition(|p| p.is_active);
                if !active.is_empty() {
                    let raw = super::complete(
                        llm,
                        recommend_system_prompt(),
                        recommend_user_prompt(
                            "Customer asked for specific product(s). \
                             Recommend the closest match from the list.",
                            &active,
                        ),
                        ENRICHMENT_MAX_TOKENS,
                    )
                    .await?;
                    recommendations = parse_recommendations(&raw)?;
                    message_to_rep = format!(
                        "Ticket {ticket_id} logged. Found matching product(s) for the customer."
                    );
                } else {
                    message_to_rep = format!(
                        "Ticket {ticket_id} logged. The mentioned product appears to be \
                         no longer available."
                    );
                    if !inactive.is_empty() {
                        message_to_rep.push_str(" Consider proposing active alternatives.");
                    }
                }
            }
        }

        SalesIntent::RequirementToProductSuggestion => {
            emitter
                .status(
                    "sales",
                    "Interpreting requirements and finding suitable products...",
                    70,
                )
                .await;
            let candidates = store
                .search_products_by_keywords(&details.need_keywords, KEYWORD_SEARCH_LIMIT)
                .await?;
            let mut active: Vec<Product> =
                candidates.into_iter().filter(|p| p.is_active).collect();
            if active.is_empty() {
                active = store.active_products().await?;
            }

            let needs = serde_json::json!({
                "need_keywords": details.need_keywords,
                "subject": email.subject(),
            })
            .to_string();
            let raw = super::complete(
                llm,
                recommend_system_prompt(),
                recommend_user_prompt(&needs, &active),
                ENRICHMENT_MAX_TOKENS,
            )
            .await?;
            recommendations = parse_recommendations(&raw)?;
            message_to_rep = format!(
                "Ticket {ticket_id} logged. Suggested multiple product options at \
                 different price points."
            );
        }

        SalesIntent::BestPriceOfferOrBundling => {
            bundles = build_bundles(llm, store, emitter, &details).await?;
            message_to_rep = bundle_message(&ticket_id, bundles.len());
        }

        // The extraction call can ask for bundles even when the classifier
        // put the email in a catch-all intent.
        SalesIntent::NeedMoreInformation | SalesIntent::Other if details.wants_bundles => {
            bundles = build_bundles(llm, store, emitter, &details).await?;
            message_to_rep = bundle_message(&ticket_id, bundles.len());
        }

        SalesIntent::NeedMoreInformation | SalesIntent::Other => {
            needs_more_info = true;
        }
    }

    if needs_more_info {
        emitter
            .status("sales", "Need more information to proceed accurately.", 78)
            .await;
        if follow_up_questions.is_empty() {
            follow_up_questions = default_follow_up_questions();
        }
        message_to_rep =
            format!("Ticket {ticket_id} logged, but more information is required to proceed.");
    }

    let result = SalesWorkflowResult {
        ticket_id,
        message_to_rep,
        recommendations,
        bundles,
        follow_up_questions,
    };

    emitter
        .status("sales", "Validating output against guardrails...", 88)
        .await;
    result.validate().map_err(TriageError::OutputValidation)?;

    let response = FinalAgentResponse {
        category: Category::Sales,
        classification: classification.clone(),
        sales: Some(result),
        support: None,
        clarification: None,
    };
    emitter.status("sales", "Sales workflow complete.", 95).await;
    Ok(response)
}

async fn build_bundles(
    llm: &dyn LlmProvider,
    store: &dyn Database,
    emitter: &RunEmitter,
    details: &IntentDetails,
) -> Result<Vec<BundleOption>, TriageError> {
    emitter
        .status("sales", "Creating bundle options and best price offers...", 70)
        .await;
    let active = store.active_products().await?;
    let context = serde_json::json!({
        "need_keywords": details.need_keywords,
        "mentions": details.mentions,
    })
    .to_string();
    let raw = super::complete(
        llm,
        bundle_system_prompt(),
        bundle_user_prompt(&context, &active),
        ENRICHMENT_MAX_TOKENS,
    )
    .await?;
    parse_bundles(&raw)
}

fn bundle_message(ticket_id: &str, count: usize) -> String {
    format!("Ticket {ticket_id} logged. Generated {count} bundle options sorted by price.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use crate::error::LlmError;
    use crate::events::RunRegistry;
    use crate::llm::{CompletionRequest, CompletionResponse};
    use crate::store::{LibSqlBackend, default_products};

    // ── Parsing tests ───────────────────────────────────────────────

    fn rec_json(sku: &str, score: f64) -> serde_json::Value {
        serde_json::json!({
            "sku": sku,
            "name": "NimbusCRM Starter",
            "purpose": "Small teams CRM",
            "price_usd": 49.0,
            "score": score,
            "reasoning": "Closest match to the requested product.",
        })
    }

    fn bundle_json(name: &str, total: f64) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "items": ["PROD-CRM-001", "PROD-SUP-100"],
            "total_price_usd": total,
            "score": 0.8,
            "reasoning": "Covers CRM plus support desk needs.",
        })
    }

    #[test]
    fn recommendations_capped_at_five() {
        let items: Vec<_> = (0..8).map(|i| rec_json(&format!("SKU-{i}"), 0.9)).collect();
        let raw = serde_json::Value::Array(items).to_string();
        let recs = parse_recommendations(&raw).unwrap();
        assert_eq!(recs.len(), 5);
    }

    #[test]
    fn recommendation_scores_clamped() {
        let raw = serde_json::Value::Array(vec![rec_json("SKU-1", 1.7), rec_json("SKU-2", -0.4)])
            .to_string();
        let recs = parse_recommendations(&raw).unwrap();
        assert_eq!(recs[0].score, 1.0);
        assert_eq!(recs[1].score, 0.0);
    }

    #[test]
    fn recommendation_missing_field_fails_validation() {
        let raw = r#"[{"sku": "SKU-1", "score": 0.5}]"#;
        let err = parse_recommendations(raw).unwrap_err();
        assert!(matches!(err, TriageError::OutputValidation(_)));
    }

    #[test]
    fn recommendation_non_array_fails() {
        let err = parse_recommendations(r#"{"sku": "SKU-1"}"#).unwrap_err();
        assert!(matches!(err, TriageError::ModelResponse(_)));
    }

    #[test]
    fn bundles_sorted_ascending_by_total_price() {
        let raw = serde_json::Value::Array(vec![
            bundle_json("Premium", 400.0),
            bundle_json("Starter", 120.0),
            bundle_json("Growth", 250.0),
        ])
        .to_string();
        let bundles = parse_bundles(&raw).unwrap();
        let totals: Vec<_> = bundles.iter().map(|b| b.total_price_usd).collect();
        let mut sorted = totals.clone();
        sorted.sort();
        assert_eq!(totals, sorted);
        assert_eq!(bundles[0].name, "Starter");
        assert_eq!(bundles[2].name, "Premium");
    }

    #[test]
    fn bundles_may_be_fewer_than_requested() {
        let raw = serde_json::Value::Array(vec![bundle_json("Only", 99.0)]).to_string();
        let bundles = parse_bundles(&raw).unwrap();
        assert_eq!(bundles.len(), 1);
    }

    #[test]
    fn bundle_with_too_many_items_fails() {
        let mut bad = bundle_json("Overfull", 99.0);
        bad["items"] = serde_json::json!(["a", "b", "c", "d", "e", "f", "g"]);
        let raw = serde_json::Value::Array(vec![bad]).to_string();
        assert!(parse_bundles(&raw).is_err());
    }

    // ── Workflow tests with a scripted LLM ──────────────────────────

    /// Mock LLM returning scripted responses in order.
    struct ScriptedLlm {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let content = self
                .responses
                .lock()
                .await
                .pop_front()
                .expect("scripted LLM ran out of responses");
            Ok(CompletionResponse {
                content,
                input_tokens: 100,
                output_tokens: 50,
            })
        }
    }

    async fn seeded_store() -> LibSqlBackend {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store.seed_products_if_empty(&default_products()).await.unwrap();
        store
    }

    fn sales_classification(intent: SalesIntent) -> ClassificationResult {
        ClassificationResult {
            category: Category::Sales,
            intent,
            confidence: 0.9,
            reasoning: "Sales request per the email content.".to_string(),
        }
    }

    fn email() -> EmailInput {
        EmailInput::new(
            "Pricing question",
            "I would like a quote for your CRM bundle for 20 seats",
            vec![],
        )
        .unwrap()
    }

    const EMPTY_DETAILS: &str = "{}";

    #[tokio::test]
    async fn bundling_intent_produces_sorted_bundles_and_sr_ticket() {
        let bundles = serde_json::Value::Array(vec![
            bundle_json("Premium", 400.0),
            bundle_json("Starter", 120.0),
        ])
        .to_string();
        let llm = ScriptedLlm::new(vec![EMPTY_DETAILS, &bundles]);
        let store = seeded_store().await;
        let registry = RunRegistry::new();
        let emitter = registry.open(Uuid::new_v4()).await;

        let response = run_sales_workflow(
            llm.as_ref(),
            &store,
            &emitter,
            &email(),
            &sales_classification(SalesIntent::BestPriceOfferOrBundling),
        )
        .await
        .unwrap();

        let sales = response.sales.as_ref().expect("sales result");
        assert!(sales.ticket_id.starts_with("SR-"));
        assert_eq!(sales.bundles.len(), 2);
        assert!(sales.bundles[0].total_price_usd <= sales.bundles[1].total_price_usd);
        assert!(response.validate().is_ok());

        // Ticket row committed
        let record = store.get_ticket(&sales.ticket_id).await.unwrap();
        assert!(record.is_some());
    }

    #[tokio::test]
    async fn wants_bundles_flag_triggers_bundle_path_for_other_intent() {
        let bundles = serde_json::Value::Array(vec![bundle_json("Starter", 120.0)]).to_string();
        let llm = ScriptedLlm::new(vec![r#"{"wants_bundles": true}"#, &bundles]);
        let store = seeded_store().await;
        let registry = RunRegistry::new();
        let emitter = registry.open(Uuid::new_v4()).await;

        let response = run_sales_workflow(
            llm.as_ref(),
            &store,
            &emitter,
            &email(),
            &sales_classification(SalesIntent::Other),
        )
        .await
        .unwrap();

        let sales = response.sales.unwrap();
        assert_eq!(sales.bundles.len(), 1);
    }

    #[tokio::test]
    async fn specific_product_not_found_reports_it() {
        let llm = ScriptedLlm::new(vec![r#"{"mentions": ["FrobnicatorX"]}"#]);
        let store = seeded_store().await;
        let registry = RunRegistry::new();
        let emitter = registry.open(Uuid::new_v4()).await;

        let response = run_sales_workflow(
            llm.as_ref(),
            &store,
            &emitter,
            &email(),
            &sales_classification(SalesIntent::SpecificProductQuery),
        )
        .await
        .unwrap();

        let sales = response.sales.unwrap();
        assert!(sales.recommendations.is_empty());
        assert!(sales.message_to_rep.contains("not found"));
    }

    #[tokio::test]
    async fn specific_product_inactive_only_reports_discontinued() {
        let llm = ScriptedLlm::new(vec![r#"{"mentions": ["LegacyBundle"]}"#]);
        let store = seeded_store().await;
        let registry = RunRegistry::new();
        let emitter = registry.open(Uuid::new_v4()).await;

        let response = run_sales_workflow(
            llm.as_ref(),
            &store,
            &emitter,
            &email(),
            &sales_classification(SalesIntent::SpecificProductQuery),
        )
        .await
        .unwrap();

        let sales = response.sales.unwrap();
        assert!(sales.message_to_rep.contains("no longer available"));
        assert!(sales.message_to_rep.contains("active alternatives"));
    }

    #[tokio::test]
    async fn specific_product_active_match_gets_recommendations() {
        let recs = serde_json::Value::Array(vec![rec_json("PROD-CRM-001", 0.95)]).to_string();
        let llm = ScriptedLlm::new(vec![r#"{"mentions": ["NimbusCRM Starter"]}"#, &recs]);
        let store = seeded_store().await;
        let registry = RunRegistry::new();
        let emitter = registry.open(Uuid::new_v4()).await;

        let response = run_sales_workflow(
            llm.as_ref(),
            &store,
            &emitter,
            &email(),
            &sales_classification(SalesIntent::SpecificProductQuery),
        )
        .await
        .unwrap();

        let sales = response.sales.unwrap();
        assert_eq!(sales.recommendations.len(), 1);
        assert_eq!(sales.recommendations[0].sku, "PROD-CRM-001");
    }

    #[tokio::test]
    async fn need_more_info_supplies_default_questions() {
        let llm = ScriptedLlm::new(vec![EMPTY_DETAILS]);
        let store = seeded_store().await;
        let registry = RunRegistry::new();
        let emitter = registry.open(Uuid::new_v4()).await;

        let response = run_sales_workflow(
            llm.as_ref(),
            &store,
            &emitter,
            &email(),
            &sales_classification(SalesIntent::NeedMoreInformation),
        )
        .await
        .unwrap();

        let sales = response.sales.unwrap();
        assert_eq!(sales.follow_up_questions.len(), 3);
        assert!(sales.message_to_rep.contains("more information is required"));
    }

    #[tokio::test]
    async fn malformed_enrichment_reply_aborts_but_ticket_persists() {
        let llm = ScriptedLlm::new(vec![EMPTY_DETAILS, "not json at all"]);
        let store = seeded_store().await;
        let registry = RunRegistry::new();
        let emitter = registry.open(Uuid::new_v4()).await;

        let err = run_sales_workflow(
            llm.as_ref(),
            &store,
            &emitter,
            &email(),
            &sales_classification(SalesIntent::BestPriceOfferOrBundling),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TriageError::ModelResponse(_)));

        // The ticket row from step (a) is not rolled back.
        assert_eq!(store.sales_ticket_count().await, 1);
    }
}
