//! Domain types for the triage pipeline.
//!
//! Model-facing output types carry explicit `validate()` methods returning
//! `Result` — parse-then-validate, no panics, no implicit exceptions across
//! workflow stages. Everything here is plain data; the workflows own the
//! side effects.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SafetyError;

// ── Email input ─────────────────────────────────────────────────────

/// Subject length ceiling (chars).
pub const SUBJECT_MAX_CHARS: usize = 200;
/// Body length floor (chars).
pub const BODY_MIN_CHARS: usize = 10;
/// Body length ceiling (chars).
pub const BODY_MAX_CHARS: usize = 20_000;

/// Metadata for one uploaded attachment. Content is never inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// A validated inbound email.
///
/// Constructed only through [`EmailInput::new`]; immutable afterward.
#[derive(Debug, Clone)]
pub struct EmailInput {
    subject: String,
    body: String,
    attachments: Vec<AttachmentInfo>,
}

impl EmailInput {
    /// Validate field constraints and construct.
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        attachments: Vec<AttachmentInfo>,
    ) -> Result<Self, SafetyError> {
        let subject = subject.into();
        let body = body.into();

        let subject_len = subject.chars().count();
        if subject_len == 0 || subject_len > SUBJECT_MAX_CHARS {
            return Err(SafetyError::InvalidField {
                field: "subject".to_string(),
                reason: format!("must be 1-{SUBJECT_MAX_CHARS} characters, got {subject_len}"),
            });
        }

        let body_len = body.chars().count();
        if body_len < BODY_MIN_CHARS || body_len > BODY_MAX_CHARS {
            return Err(SafetyError::InvalidField {
                field: "body".to_string(),
                reason: format!(
                    "must be {BODY_MIN_CHARS}-{BODY_MAX_CHARS} characters, got {body_len}"
                ),
            });
        }

        Ok(Self {
            subject,
            body,
            attachments,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn attachments(&self) -> &[AttachmentInfo] {
        &self.attachments
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Top-level email category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sales,
    Support,
    Unknown,
}

impl Category {
    /// Short label for logging and messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Support => "support",
            Self::Unknown => "unknown",
        }
    }
}

/// Classified intent of the email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesIntent {
    SpecificProductQuery,
    RequirementToProductSuggestion,
    BestPriceOfferOrBundling,
    NeedMoreInformation,
    Other,
}

impl SalesIntent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SpecificProductQuery => "specific_product_query",
            Self::RequirementToProductSuggestion => "requirement_to_product_suggestion",
            Self::BestPriceOfferOrBundling => "best_price_offer_or_bundling",
            Self::NeedMoreInformation => "need_more_information",
            Self::Other => "other",
        }
    }
}

/// Urgency extracted from a support email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Result of the classification call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub intent: SalesIntent,
    /// Always clamped into [0, 1] before validation.
    pub confidence: f32,
    pub reasoning: String,
}

impl ClassificationResult {
    /// Check schema constraints. Confidence must already be clamped.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "classification confidence {} outside [0, 1]",
                self.confidence
            ));
        }
        check_len("classification reasoning", &self.reasoning, 10, 1000)?;
        Ok(())
    }
}

/// Clamp a raw model score into [0, 1]. Non-finite values collapse to 0.
pub fn clamp_score(raw: f64) -> f32 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

fn check_len(what: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(format!("{what} must be {min}-{max} characters, got {len}"));
    }
    Ok(())
}

// ── Workflow outputs ────────────────────────────────────────────────

/// One ranked product recommendation from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecommendation {
    pub sku: String,
    pub name: String,
    pub purpose: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_usd: Decimal,
    /// Always clamped into [0, 1] before validation.
    pub score: f32,
    pub reasoning: String,
}

impl ProductRecommendation {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.score) {
            return Err(format!("recommendation score {} outside [0, 1]", self.score));
        }
        check_len("recommendation reasoning", &self.reasoning, 10, 800)?;
        Ok(())
    }
}

/// One bundle option from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleOption {
    pub name: String,
    /// SKUs or product names, 1-6 entries.
    pub items: Vec<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price_usd: Decimal,
    pub score: f32,
    pub reasoning: String,
}

impl BundleOption {
    pub fn validate(&self) -> Result<(), String> {
        if self.items.is_empty() || self.items.len() > 6 {
            return Err(format!(
                "bundle '{}' must have 1-6 items, got {}",
                self.name,
                self.items.len()
            ));
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Err(format!("bundle score {} outside [0, 1]", self.score));
        }
        check_len("bundle reasoning", &self.reasoning, 10, 800)?;
        Ok(())
    }
}

/// Output of the sales workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesWorkflowResult {
    pub ticket_id: String,
    pub message_to_rep: String,
    #[serde(default)]
    pub recommendations: Vec<ProductRecommendation>,
    #[serde(default)]
    pub bundles: Vec<BundleOption>,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

impl SalesWorkflowResult {
    pub fn validate(&self) -> Result<(), String> {
        if self.ticket_id.is_empty() {
            return Err("sales result has empty ticket id".to_string());
        }
        if self.message_to_rep.is_empty() {
            return Err("sales result has empty rep message".to_string());
        }
        for rec in &self.recommendations {
            rec.validate()?;
        }
        for bundle in &self.bundles {
            bundle.validate()?;
        }
        Ok(())
    }
}

/// Output of the support workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportWorkflowResult {
    pub ticket_id: String,
    pub message_to_rep: String,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

impl SupportWorkflowResult {
    pub fn validate(&self) -> Result<(), String> {
        if self.ticket_id.is_empty() {
            return Err("support result has empty ticket id".to_string());
        }
        if self.message_to_rep.is_empty() {
            return Err("support result has empty rep message".to_string());
        }
        Ok(())
    }
}

/// Output of the unknown path — a clarification request, no ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationResult {
    pub message_to_rep: String,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

/// The aggregated response handed to the caller.
///
/// Exactly the slot matching `category` is populated: `sales` for sales,
/// `support` for support, `clarification` for unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAgentResponse {
    pub category: Category,
    pub classification: ClassificationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales: Option<SalesWorkflowResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<SupportWorkflowResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ClarificationResult>,
}

impl FinalAgentResponse {
    /// Re-validate the whole response — the single point guaranteeing the
    /// externally observed contract regardless of which workflow built it.
    pub fn validate(&self) -> Result<(), String> {
        self.classification.validate()?;

        let slots = [
            self.sales.is_some(),
            self.support.is_some(),
            self.clarification.is_some(),
        ];
        let populated = slots.iter().filter(|s| **s).count();
        if populated != 1 {
            return Err(format!(
                "final response must populate exactly one result slot, got {populated}"
            ));
        }

        match self.category {
            Category::Sales => match &self.sales {
                Some(sales) => sales.validate(),
                None => Err("category is sales but sales result is missing".to_string()),
            },
            Category::Support => match &self.support {
                Some(support) => support.validate(),
                None => Err("category is support but support result is missing".to_string()),
            },
            Category::Unknown => match &self.clarification {
                Some(_) => Ok(()),
                None => Err("category is unknown but clarification is missing".to_string()),
            },
        }
    }
}

// ── Catalog & tickets ───────────────────────────────────────────────

/// A product from the reference catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    pub name: String,
    pub category: String,
    pub purpose: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_usd: Decimal,
    pub is_active: bool,
    /// Space-separated keyword string for substring search.
    pub keywords: String,
}

/// Which table a ticket lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Sales,
    Support,
}

impl TicketKind {
    /// Ticket id prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Sales => "SR-",
            Self::Support => "SUP-",
        }
    }

    /// Infer the kind from a ticket id prefix.
    pub fn from_ticket_id(ticket_id: &str) -> Option<Self> {
        if ticket_id.starts_with("SR-") {
            Some(Self::Sales)
        } else if ticket_id.starts_with("SUP-") {
            Some(Self::Support)
        } else {
            None
        }
    }
}

/// Generate a ticket id: kind prefix + 10 uppercase alphanumeric chars.
pub fn new_ticket_id(kind: TicketKind) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(10)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("{}{}", kind.prefix(), suffix)
}

/// A persisted ticket as returned by the lookup interface, with the
/// embedded JSON columns deserialized.
#[derive(Debug, Clone, Serialize)]
pub struct TicketRecord {
    pub ticket_id: String,
    pub kind: TicketKind,
    pub created_at: DateTime<Utc>,
    pub email_subject: String,
    pub email_body: String,
    pub attachments: Vec<AttachmentInfo>,
    pub classification: ClassificationResult,
    /// Populated for support tickets only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Populated for support tickets only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}
