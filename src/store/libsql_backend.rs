//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. One connection, reused for
//! all operations; every statement commits immediately.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, NewTicket};
use crate::triage::types::{AttachmentInfo, ClassificationResult, Product, TicketKind, TicketRecord};

/// libSQL database backend.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn fetch_ticket(
        &self,
        kind: TicketKind,
        ticket_id: &str,
    ) -> Result<Option<TicketRecord>, DatabaseError> {
        let sql = match kind {
            TicketKind::Sales => {
                "SELECT ticket_id, created_at, email_subject, email_body, attachments_json, \
                 classification_json FROM sales_requests WHERE ticket_id = ?1"
            }
            TicketKind::Support => {
                "SELECT ticket_id, created_at, email_subject, email_body, attachments_json, \
                 classification_json, intent, confidence FROM support_requests WHERE ticket_id = ?1"
            }
        };

        let mut rows = self
            .conn()
            .query(sql, params![ticket_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_ticket: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_ticket(&row, kind)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_ticket: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const PRODUCT_COLUMNS: &str = "sku, name, category, purpose, price_usd, is_active, keywords";

/// Map a libsql Row to a Product. Column order matches PRODUCT_COLUMNS.
fn row_to_product(row: &libsql::Row) -> Result<Product, libsql::Error> {
    let price: f64 = row.get(4)?;
    let is_active: i64 = row.get(5)?;
    Ok(Product {
        sku: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        purpose: row.get(3)?,
        price_usd: Decimal::from_f64_retain(price).unwrap_or_default(),
        is_active: is_active != 0,
        keywords: row.get(6)?,
    })
}

/// Map a ticket row to a TicketRecord, deserializing the JSON columns.
fn row_to_ticket(row: &libsql::Row, kind: TicketKind) -> Result<TicketRecord, DatabaseError> {
    let get_err = |e: libsql::Error| DatabaseError::Query(format!("ticket row parse: {e}"));

    let ticket_id: String = row.get(0).map_err(get_err)?;
    let created_str: String = row.get(1).map_err(get_err)?;
    let email_subject: String = row.get(2).map_err(get_err)?;
    let email_body: String = row.get(3).map_err(get_err)?;
    let attachments_json: String = row.get(4).map_err(get_err)?;
    let classification_json: String = row.get(5).map_err(get_err)?;

    let attachments: Vec<AttachmentInfo> = serde_json::from_str(&attachments_json)
        .map_err(|e| DatabaseError::Serialization(format!("attachments for {ticket_id}: {e}")))?;
    let classification: ClassificationResult = serde_json::from_str(&classification_json)
        .map_err(|e| DatabaseError::Serialization(format!("classification for {ticket_id}: {e}")))?;

    let (intent, confidence) = match kind {
        TicketKind::Sales => (None, None),
        TicketKind::Support => {
            let intent: String = row.get(6).map_err(get_err)?;
            let confidence: f64 = row.get(7).map_err(get_err)?;
            (Some(intent), Some(confidence))
        }
    };

    Ok(TicketRecord {
        ticket_id,
        kind,
        created_at: parse_datetime(&created_str),
        email_subject,
        email_body,
        attachments,
        classification,
        intent,
        confidence,
    })
}

fn serialize_ticket_json(ticket: &NewTicket<'_>) -> Result<(String, String), DatabaseError> {
    let attachments_json = serde_json::to_string(ticket.attachments)
        .map_err(|e| DatabaseError::Serialization(format!("attachments: {e}")))?;
    let classification_json = serde_json::to_string(ticket.classification)
        .map_err(|e| DatabaseError::Serialization(format!("classification: {e}")))?;
    Ok((attachments_json, classification_json))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Tickets ─────────────────────────────────────────────────────

    async fn insert_sales_ticket(&self, ticket: &NewTicket<'_>) -> Result<(), DatabaseError> {
        let (attachments_json, classification_json) = serialize_ticket_json(ticket)?;

        self.conn()
            .execute(
                "INSERT INTO sales_requests (ticket_id, created_at, email_subject, email_body, \
                 attachments_json, classification_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    ticket.ticket_id,
                    Utc::now().to_rfc3339(),
                    ticket.email_subject,
                    ticket.email_body,
                    attachments_json,
                    classification_json,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_sales_ticket: {e}")))?;

        debug!(ticket_id = %ticket.ticket_id, "Sales ticket inserted");
        Ok(())
    }

    async fn insert_support_ticket(
        &self,
        ticket: &NewTicket<'_>,
        intent: &str,
        confidence: f64,
    ) -> Result<(), DatabaseError> {
        let (attachments_json, classification_json) = serialize_ticket_json(ticket)?;

        self.conn()
            .execute(
                "INSERT INTO support_requests (ticket_id, created_at, email_subject, email_body, \
                 attachments_json, intent, confidence, classification_json) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    ticket.ticket_id,
                    Utc::now().to_rfc3339(),
                    ticket.email_subject,
                    ticket.email_body,
                    attachments_json,
                    intent,
                    confidence,
                    classification_json,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_support_ticket: {e}")))?;

        debug!(ticket_id = %ticket.ticket_id, "Support ticket inserted");
        Ok(())
    }

    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<TicketRecord>, DatabaseError> {
        match TicketKind::from_ticket_id(ticket_id) {
            Some(kind) => self.fetch_ticket(kind, ticket_id).await,
            // Unprefixed id — try both tables before giving up.
            None => {
                if let Some(record) = self.fetch_ticket(TicketKind::Sales, ticket_id).await? {
                    return Ok(Some(record));
                }
                self.fetch_ticket(TicketKind::Support, ticket_id).await
            }
        }
    }

    // ── Catalog ─────────────────────────────────────────────────────

    async fn seed_products_if_empty(&self, products: &[Product]) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM products", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("seed_products count: {e}")))?;

        let count: i64 = match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("seed_products count: {e}")))?,
            _ => 0,
        };
        if count > 0 {
            return Ok(0);
        }

        for product in products {
            self.conn()
                .execute(
                    "INSERT INTO products (sku, name, category, purpose, price_usd, is_active, \
                     keywords) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        product.sku.as_str(),
                        product.name.as_str(),
                        product.category.as_str(),
                        product.purpose.as_str(),
                        product.price_usd.to_f64().unwrap_or_default(),
                        product.is_active as i64,
                        product.keywords.as_str(),
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("seed_products insert: {e}")))?;
        }

        info!(count = products.len(), "Seeded product catalog");
        Ok(products.len())
    }

    async fn search_products_by_mention(
        &self,
        mentions: &[String],
    ) -> Result<Vec<Product>, DatabaseError> {
        let mut results: Vec<Product> = Vec::new();

        for mention in mentions {
            let needle = mention.trim();
            if needle.is_empty() {
                continue;
            }
            let like = format!("%{needle}%");

            let mut rows = self
                .conn()
                .query(
                    &format!(
                        "SELECT {PRODUCT_COLUMNS} FROM products \
                         WHERE sku LIKE ?1 OR name LIKE ?1 LIMIT 10"
                    ),
                    params![like],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("search_products_by_mention: {e}")))?;

            while let Ok(Some(row)) = rows.next().await {
                let product = row_to_product(&row).map_err(|e| {
                    DatabaseError::Query(format!("search_products_by_mention row: {e}"))
                })?;
                if !results.iter().any(|p| p.sku == product.sku) {
                    results.push(product);
                }
            }
        }

        Ok(results)
    }

    async fn search_products_by_keywords(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<Product>, DatabaseError> {
        let mut results: Vec<Product> = Vec::new();

        for keyword in keywords {
            if results.len() >= limit {
                break;
            }
            let needle = keyword.trim();
            if needle.is_empty() {
                continue;
            }
            let like = format!("%{needle}%");

            let mut rows = self
                .conn()
                .query(
                    &format!(
                        "SELECT {PRODUCT_COLUMNS} FROM products WHERE keywords LIKE ?1 LIMIT ?2"
                    ),
                    params![like, limit as i64],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("search_products_by_keywords: {e}")))?;

            while let Ok(Some(row)) = rows.next().await {
                if results.len() >= limit {
                    break;
                }
                let product = row_to_product(&row).map_err(|e| {
                    DatabaseError::Query(format!("search_products_by_keywords row: {e}"))
                })?;
                if !results.iter().any(|p| p.sku == product.sku) {
                    results.push(product);
                }
            }
        }

        Ok(results)
    }

    async fn active_products(&self) -> Result<Vec<Product>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products \
                     WHERE is_active = 1 ORDER BY price_usd ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("active_products: {e}")))?;

        let mut products = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            products.push(
                row_to_product(&row)
                    .map_err(|e| DatabaseError::Query(format!("active_products row: {e}")))?,
            );
        }
        Ok(products)
    }
}

#[cfg(test)]
impl LibSqlBackend {
    /// Test helper: number of rows in sales_requests.
    pub(crate) async fn sales_ticket_count(&self) -> i64 {
        self.count_rows("sales_requests").await
    }

    /// Test helper: number of rows in support_requests.
    pub(crate) async fn support_ticket_count(&self) -> i64 {
        self.count_rows("support_requests").await
    }

    async fn count_rows(&self, table: &str) -> i64 {
        let mut rows = self
            .conn()
            .query(&format!("SELECT COUNT(*) FROM {table}"), ())
            .await
            .expect("count query");
        match rows.next().await {
            Ok(Some(row)) => row.get(0).unwrap_or(0),
            _ => 0,
        }
    }
}
