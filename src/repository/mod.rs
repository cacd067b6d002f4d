//! Repository module
//!
//! Persistence seam for the ledger. Every mutating method is one atomic
//! step: it either applies the whole transition (card, reward, transaction
//! log) or leaves the store untouched.
//!
//! Implementations:
//! - `MemoryLedgerStore`: in-process state behind a single `RwLock`
//! - `PgLedgerStore`: PostgreSQL with row locks and unique indexes

mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{Reward, StampCard};
use crate::analytics::{Analytics, AnalyticsScope};
use crate::domain::{
    ApiKeyRecord, CardTemplate, Customer, CustomerIdentifier, IdempotencyRecord, PurchaseAmount,
    StoreAccount, Transaction,
};

pub use error::RepositoryError;
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Attempts at drawing an unused reward code before giving up
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Input for one stamp issuance
#[derive(Debug, Clone)]
pub struct StampRequest {
    pub customer_id: Uuid,
    pub store_id: Uuid,
    pub template: CardTemplate,
    pub purchase: Option<PurchaseAmount>,
    pub now: DateTime<Utc>,
}

/// Everything a stamp issuance changed
#[derive(Debug, Clone)]
pub struct StampOutcome {
    pub card: StampCard,
    pub stamps_added: i32,
    /// Present only when this issuance completed the card
    pub reward: Option<Reward>,
    pub transaction: Transaction,
}

/// Input for one redemption
#[derive(Debug, Clone)]
pub struct RedeemRequest {
    /// Normalized reward code
    pub code: String,
    pub store_id: Uuid,
    /// Recorded together with the redemption when present
    pub idempotency: Option<IdempotencyClaim>,
    pub now: DateTime<Utc>,
}

/// Idempotency key and request fingerprint for a redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyClaim {
    pub key: Uuid,
    pub request_hash: String,
}

/// Everything a redemption changed
#[derive(Debug, Clone)]
pub struct RedemptionOutcome {
    pub reward: Reward,
    pub card: StampCard,
    pub transaction: Transaction,
}

/// Store listing row for the admin portal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    #[serde(flatten)]
    pub store: StoreAccount,
    pub active_cards: i64,
    pub completed_cards: i64,
}

/// Interface for ledger persistence
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Stores and templates
    // -------------------------------------------------------------------------

    /// Create a store together with its staff API key
    async fn insert_store(&self, store: &StoreAccount, staff_key: &ApiKeyRecord) -> Result<()>;

    async fn get_store(&self, store_id: Uuid) -> Result<Option<StoreAccount>>;

    /// Flip the active flag; `None` if the store does not exist
    async fn set_store_active(&self, store_id: Uuid, active: bool) -> Result<Option<StoreAccount>>;

    async fn list_stores(&self) -> Result<Vec<StoreSummary>>;

    /// Insert a template and retire the store's previous ones
    async fn insert_template(&self, template: &CardTemplate) -> Result<()>;

    /// The store's newest active template
    async fn current_template(&self, store_id: Uuid) -> Result<Option<CardTemplate>>;

    // -------------------------------------------------------------------------
    // Customers
    // -------------------------------------------------------------------------

    /// Register a customer with their API key; contacts must be unused
    async fn insert_customer(&self, customer: &Customer, key: &ApiKeyRecord) -> Result<()>;

    async fn find_customer(&self, identifier: &CustomerIdentifier) -> Result<Option<Customer>>;

    // -------------------------------------------------------------------------
    // Ledger mutations
    // -------------------------------------------------------------------------

    /// Apply a stamp to the customer's open card, opening one if needed.
    ///
    /// Fails with `StoreInactive` (and writes nothing) when the store was
    /// deactivated concurrently.
    async fn issue_stamp(&self, request: StampRequest) -> Result<StampOutcome>;

    /// Redeem the reward with the given code at the given store
    async fn redeem_reward(&self, request: RedeemRequest) -> Result<RedemptionOutcome>;

    async fn find_idempotency(&self, key: Uuid) -> Result<Option<IdempotencyRecord>>;

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    async fn get_card(&self, card_id: Uuid) -> Result<Option<StampCard>>;

    async fn get_reward(&self, reward_id: Uuid) -> Result<Option<Reward>>;

    /// Customer's cards, newest first
    async fn list_cards(&self, customer_id: Uuid) -> Result<Vec<StampCard>>;

    /// Customer's rewards, newest first
    async fn list_rewards(&self, customer_id: Uuid) -> Result<Vec<Reward>>;

    /// Store's transaction log, newest first
    async fn list_transactions(&self, store_id: Uuid, limit: usize) -> Result<Vec<Transaction>>;

    /// Aggregate the ledger; `StoreNotFound` for an unknown store scope
    async fn analytics(&self, scope: AnalyticsScope, recent_limit: usize) -> Result<Analytics>;

    // -------------------------------------------------------------------------
    // Access control
    // -------------------------------------------------------------------------

    /// Insert an API key, replacing any key with the same hash
    async fn upsert_api_key(&self, key: &ApiKeyRecord) -> Result<()>;

    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>>;
}
