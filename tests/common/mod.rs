//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::util::ServiceExt;

use stamp_ledger::domain::reward_code::RewardCodeGenerator;
use stamp_ledger::domain::Role;
use stamp_ledger::handlers::IssuedApiKey;
use stamp_ledger::{build_router, db, AppState, LedgerStore, MemoryLedgerStore, PgLedgerStore};

pub const ADMIN_KEY: &str = "test_admin_key_123";

/// Router plus the store behind it
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn LedgerStore>,
}

impl TestApp {
    /// Send one request and decode the JSON body (Null for non-JSON bodies)
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        api_key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send_with_headers(method, uri, api_key, &[], body).await
    }

    pub async fn send_with_headers(
        &self,
        method: &str,
        uri: &str,
        api_key: Option<&str>,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = api_key {
            builder = builder.header("X-API-Key", key);
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, json)
    }
}

async fn build_app(store: Arc<dyn LedgerStore>) -> TestApp {
    let admin = IssuedApiKey::from_secret(
        ADMIN_KEY.to_string(),
        "test admin",
        Role::Admin,
        None,
        None,
        Utc::now(),
    );
    store.upsert_api_key(&admin.record).await.unwrap();

    TestApp {
        router: build_router(AppState::new(store.clone(), 5)),
        store,
    }
}

/// App backed by the in-memory store
pub async fn memory_app() -> TestApp {
    build_app(Arc::new(MemoryLedgerStore::new(RewardCodeGenerator::default()))).await
}

/// Setup test database - apply the schema and truncate tables
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    db::apply_schema(&pool).await.expect("Failed to apply schema");

    sqlx::query(
        "TRUNCATE TABLE redemption_idempotency, transactions, rewards, stamp_cards, \
         card_templates, api_keys, customers, stores CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    pool
}

/// App backed by PostgreSQL
pub async fn postgres_app() -> TestApp {
    let pool = setup_test_db().await;
    build_app(Arc::new(PgLedgerStore::new(pool, RewardCodeGenerator::default()))).await
}
