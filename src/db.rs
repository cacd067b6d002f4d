//! Database module
//!
//! Database connection and schema utilities.

use sqlx::{Executor, PgPool};

/// Bundled schema; every statement is idempotent
const SCHEMA: &str = include_str!("../migrations/0001_stamp_ledger.sql");

/// Tables the ledger needs
const REQUIRED_TABLES: &[&str] = &[
    "stores",
    "card_templates",
    "customers",
    "stamp_cards",
    "rewards",
    "transactions",
    "api_keys",
    "redemption_idempotency",
];

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Apply the bundled schema
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    // multi-statement scripts need the simple query protocol
    pool.execute(SCHEMA).await?;

    tracing::info!("Database schema applied");
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
