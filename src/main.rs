//! Stamp Ledger - Loyalty Stamp Card Backend API
//!
//! Stores issue stamps on customer cards, completed cards unlock single-use
//! reward codes, and staff redeem those codes at the counter.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stamp_ledger::db;
use stamp_ledger::domain::reward_code::RewardCodeGenerator;
use stamp_ledger::domain::Role;
use stamp_ledger::handlers::IssuedApiKey;
use stamp_ledger::{
    build_router, AppState, Config, LedgerStore, MemoryLedgerStore, PgLedgerStore, StorageBackend,
};

/// Initialize tracing/logging
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stamp_ledger=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Connect to PostgreSQL and make sure the schema is in place
async fn connect_postgres(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;

    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await?;

    db::verify_connection(&pool).await?;

    if config.database_auto_migrate {
        db::apply_schema(&pool).await?;
    }

    // Verify database schema
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");
    Ok(pool)
}

/// Register the configured admin key so the admin portal can sign in
async fn bootstrap_admin_key(store: &dyn LedgerStore, secret: &str) -> anyhow::Result<()> {
    let key = IssuedApiKey::from_secret(
        secret.to_string(),
        "bootstrap admin",
        Role::Admin,
        None,
        None,
        Utc::now(),
    );
    store.upsert_api_key(&key.record).await?;

    tracing::info!(api_key_id = %key.record.id, "Admin API key registered");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let codes = RewardCodeGenerator::new(config.reward_code_length);

    tracing::info!(backend = ?config.storage_backend, "Starting stamp ledger server");

    let (store, pool): (Arc<dyn LedgerStore>, Option<PgPool>) = match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on shutdown");
            (Arc::new(MemoryLedgerStore::new(codes)), None)
        }
        StorageBackend::Postgres => {
            let pool = connect_postgres(&config).await?;
            (Arc::new(PgLedgerStore::new(pool.clone(), codes)), Some(pool))
        }
    };

    match config.admin_api_key.as_deref() {
        Some(secret) => bootstrap_admin_key(store.as_ref(), secret).await?,
        None => tracing::warn!("ADMIN_API_KEY is not set; no admin key was registered"),
    }

    // Build router and start server
    let app = build_router(AppState::new(store, config.recent_transactions_limit));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed.");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
