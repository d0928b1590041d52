//! Support workflow — ticket logging plus troubleshooting follow-ups.
//!
//! Support tickets carry the classified intent and confidence as separate
//! queryable columns. When the extraction call yields no follow-up
//! questions, a fixed diagnostic set stands in so the rep never gets an
//! empty checklist.

use crate::error::TriageError;
use crate::events::RunEmitter;
use crate::llm::LlmProvider;
use crate::store::{Database, NewTicket};
use crate::triage::intent;
use crate::triage::types::{
    Category, ClassificationResult, EmailInput, FinalAgentResponse, SupportWorkflowResult,
    TicketKind, new_ticket_id,
};

/// Fallback diagnostic questions when extraction yields none.
fn default_follow_up_questions() -> Vec<String> {
    vec![
        "What exact error message(s) do you see (copy/paste if possible)?".to_string(),
        "When did the issue start and is it intermittent or constant?".to_string(),
        "How many users are affected and what is the business impact?".to_string(),
        "What environment is impacted (prod/stage), and what region?".to_string(),
        "Steps to reproduce (if known) and screenshots/log snippets?".to_string(),
    ]
}

/// Run the support workflow and assemble the final response.
pub async fn run_support_workflow(
    llm: &dyn LlmProvider,
    store: &dyn Database,
    emitter: &RunEmitter,
    email: &EmailInput,
    classification: &ClassificationResult,
) -> Result<FinalAgentResponse, TriageError> {
    emitter
        .status("support", "Starting support workflow: logging ticket...", 45)
        .await;

    let ticket_id = new_ticket_id(TicketKind::Support);
    store
        .insert_support_ticket(
            &NewTicket {
                ticket_id: &ticket_id,
                email_subject: email.subject(),
                email_body: email.body(),
                attachments: email.attachments(),
                classification,
            },
            classification.intent.label(),
            classification.confidence as f64,
        )
        .await?;
    emitter
        .status("support", format!("Support ticket created: {ticket_id}"), 55)
        .await;

    emitter
        .status(
            "support",
            "Extracting troubleshooting context and follow-up questions...",
            65,
        )
        .await;
    let details = intent::extract_details(llm, email, classification).await?;

    let follow_up_questions = if details.follow_up_questions.is_empty() {
        default_follow_up_questions()
    } else {
        details.follow_up_questions.clone()
    };

    let mut message_to_rep = format!(
        "Ticket {ticket_id} logged. Support request detected (urgency: {}). \
         Collect the details below and route to the support team/runbook.",
        details.urgency.label()
    );
    if !details.support_symptoms.is_empty() {
        message_to_rep.push_str(&format!(
            "\n\nObserved symptoms (extracted): {}",
            details.support_symptoms.join(", ")
        ));
    }
    if !details.environment_hints.is_empty() {
        message_to_rep.push_str(&format!(
            "\nEnvironment hints (extracted): {}",
            details.environment_hints.join(", ")
        ));
    }

    let result = SupportWorkflowResult {
        ticket_id,
        message_to_rep,
        follow_up_questions,
    };

    emitter
        .status("support", "Validating output against guardrails...", 88)
        .await;
    result.validate().map_err(TriageError::OutputValidation)?;

    let response = FinalAgentResponse {
        category: Category::Support,
        classification: classification.clone(),
        sales: None,
        support: Some(result),
        clarification: None,
    };
    emitter
        .status("support", "Support workflow complete.", 95)
        .await;
    Ok(response)
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
    use crate::triage::types::SalesIntent;

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

    fn support_classification() -> ClassificationResult {
        ClassificationResult {
            category: Category::Support,
            intent: SalesIntent::Other,
            confidence: 0.84,
            reasoning: "Production outage reported since 9am.".to_string(),
        }
    }

    fn outage_email() -> EmailInput {
        EmailInput::new(
            "App is down",
            "Our production instance returns 500 errors since 9am",
            vec![],
        )
        .unwrap()
    }

    async fn run(
        extraction_reply: &str,
    ) -> (FinalAgentResponse, LibSqlBackend) {
        let llm = ScriptedLlm::new(vec![extraction_reply]);
        let store = LibSqlBackend::new_memory().await.unwrap();
        store.seed_products_if_empty(&default_products()).await.unwrap();
        let registry = RunRegistry::new();
        let emitter = registry.open(Uuid::new_v4()).await;

        let response = run_support_workflow(
            llm.as_ref(),
            &store,
            &emitter,
            &outage_email(),
            &support_classification(),
        )
        .await
        .unwrap();
        (response, store)
    }

    #[tokio::test]
    async fn creates_sup_ticket_with_intent_and_confidence() {
        let (response, store) = run("{}").await;

        let support = response.support.as_ref().expect("support result");
        assert!(support.ticket_id.starts_with("SUP-"));
        assert!(response.validate().is_ok());

        let record = store
            .get_ticket(&support.ticket_id)
            .await
            .unwrap()
            .expect("persisted");
        assert_eq!(record.intent.as_deref(), Some("other"));
        assert!((record.confidence.unwrap() - 0.84).abs() < 1e-6);
    }

    #[tokio::test]
    async fn default_questions_when_extraction_is_empty() {
        let (response, _store) = run("{}").await;
        let support = response.support.unwrap();
        assert_eq!(support.follow_up_questions.len(), 5);
        assert!(support.message_to_rep.contains("urgency: medium"));
    }

    #[tokio::test]
    async fn extracted_context_lands_in_rep_message() {
        let reply = r#"{
            "follow_up_questions": ["Which region is affected?"],
            "support_symptoms": ["HTTP 500 on login", "elevated latency"],
            "environment_hints": ["production", "eu-west-1"],
            "urgency": "high"
        }"#;
        let (response, _store) = run(reply).await;
        let support = response.support.unwrap();

        assert_eq!(support.follow_up_questions.len(), 1);
        assert!(support.message_to_rep.contains("urgency: high"));
        assert!(support.message_to_rep.contains("HTTP 500 on login"));
        assert!(support.message_to_rep.contains("eu-west-1"));
    }
}
