//! Seed catalog — the demo product set inserted into an empty database.

use rust_decimal_macros::dec;

use crate::triage::types::Product;

/// Default product catalog: four active products across CRM, support desk,
/// and analytics, plus one inactive legacy SKU so the discontinued path is
/// exercisable out of the box.
pub fn default_products() -> Vec<Product> {
    vec![
        Product {
            sku: "PROD-CRM-001".to_string(),
            name: "NimbusCRM Starter".to_string(),
            category: "CRM".to_string(),
            purpose: "Small teams CRM with email tracking and pipelines".to_string(),
            price_usd: dec!(49.0),
            is_active: true,
            keywords: "crm pipeline leads email tracking small team starter".to_string(),
        },
        Product {
            sku: "PROD-CRM-010".to_string(),
            name: "NimbusCRM Pro".to_string(),
            category: "CRM".to_string(),
            purpose: "Advanced CRM with automation, analytics, and role-based access".to_string(),
            price_usd: dec!(149.0),
            is_active: true,
            keywords: "crm automation analytics rbac enterprise pro".to_string(),
        },
        Product {
            sku: "PROD-SUP-100".to_string(),
            name: "HelioSupport Desk".to_string(),
            category: "Support".to_string(),
            purpose: "Ticketing + SLA + knowledge base for support teams".to_string(),
            price_usd: dec!(99.0),
            is_active: true,
            keywords: "support ticketing sla knowledge base helpdesk".to_string(),
        },
        Product {
            sku: "PROD-BI-200".to_string(),
            name: "AuroraBI".to_string(),
            category: "Analytics".to_string(),
            purpose: "Self-serve dashboards and KPI tracking for leadership".to_string(),
            price_usd: dec!(199.0),
            is_active: true,
            keywords: "bi dashboards kpi analytics reporting leadership".to_string(),
        },
        Product {
            sku: "PROD-OLD-777".to_string(),
            name: "LegacyBundle X (Deprecated)".to_string(),
            category: "Bundle".to_string(),
            purpose: "Deprecated legacy bundle (not available)".to_string(),
            price_usd: dec!(79.0),
            is_active: false,
            keywords: "legacy deprecated bundle old".to_string(),
        },
    ]
}
