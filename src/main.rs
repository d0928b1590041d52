use std::sync::Arc;

use mailroom::config::{ServerConfig, llm_config_from_env};
use mailroom::events::RunRegistry;
use mailroom::llm::create_provider;
use mailroom::server::api_routes;
use mailroom::store::{Database, LibSqlBackend, default_products};
use mailroom::triage::TriageRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env();
    let llm_config = llm_config_from_env()?;
    let llm = create_provider(&llm_config)?;

    eprintln!("📬 mailroom v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm.model_name());
    eprintln!("   API: http://{}/api/triage", config.bind_addr);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    let seeded = store.seed_products_if_empty(&default_products()).await?;
    if seeded > 0 {
        eprintln!("   Seeded {} catalog products", seeded);
    }

    // ── Runner + API server ──────────────────────────────────────────
    let registry = RunRegistry::new();
    let runner = TriageRunner::new(llm, store, registry);
    let app = api_routes(runner, config.heartbeat);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
