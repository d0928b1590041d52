//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::triage::types::{AttachmentInfo, ClassificationResult, Product, TicketRecord};

/// A ticket row to insert. Borrowed — callers keep ownership of the run state.
pub struct NewTicket<'a> {
    pub ticket_id: &'a str,
    pub email_subject: &'a str,
    pub email_body: &'a str,
    pub attachments: &'a [AttachmentInfo],
    pub classification: &'a ClassificationResult,
}

/// Backend-agnostic database trait covering tickets and the product catalog.
///
/// Every operation is a single immediately-committed statement — no
/// multi-statement transactions, no rollback of earlier inserts when a later
/// run stage fails.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Tickets ─────────────────────────────────────────────────────

    /// Insert a sales ticket row.
    async fn insert_sales_ticket(&self, ticket: &NewTicket<'_>) -> Result<(), DatabaseError>;

    /// Insert a support ticket row. Intent and confidence are stored as
    /// separate queryable columns in addition to the classification JSON.
    async fn insert_support_ticket(
        &self,
        ticket: &NewTicket<'_>,
        intent: &str,
        confidence: f64,
    ) -> Result<(), DatabaseError>;

    /// Fetch a ticket by id with its JSON columns deserialized.
    /// Unknown ids yield `Ok(None)`, never an error.
    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<TicketRecord>, DatabaseError>;

    // ── Catalog ─────────────────────────────────────────────────────

    /// Insert the given products if the catalog is empty.
    /// Returns the number of rows inserted (0 if already seeded).
    async fn seed_products_if_empty(&self, products: &[Product]) -> Result<usize, DatabaseError>;

    /// Products whose sku or name substring-matches any mention,
    /// deduplicated by sku. Includes inactive products.
    async fn search_products_by_mention(
        &self,
        mentions: &[String],
    ) -> Result<Vec<Product>, DatabaseError>;

    /// Products whose keyword field substring-matches any keyword,
    /// up to `limit` rows.
    async fn search_products_by_keywords(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<Product>, DatabaseError>;

    /// All active products, sorted ascending by price.
    async fn active_products(&self) -> Result<Vec<Product>, DatabaseError>;
}
