//! PostgreSQL ledger store
//!
//! One database transaction per mutating call. Rows touched by a mutation are
//! locked with `FOR UPDATE` (store rows with `FOR SHARE`), and the unique
//! indexes on `stamp_cards (customer_id, template_id) WHERE status <> 'redeemed'`
//! and `rewards (code)` back the in-code checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction as PgTransaction};
use uuid::Uuid;

use crate::aggregate::{
    CardSnapshot, CardStatus, Reward, RewardSnapshot, RewardStatus, StampCard,
};
use crate::analytics::{
    ActivityTotals, Analytics, AnalyticsScope, CardCounts, GlobalAnalytics, RecentTransaction,
    RewardCounts, StoreAnalytics,
};
use crate::domain::{
    ApiKeyRecord, CardTemplate, Customer, CustomerIdentifier, DomainError, IdempotencyRecord,
    IssuanceRule, RewardCodeGenerator, StoreAccount, Transaction,
};

use super::{
    LedgerStore, RedeemRequest, RedemptionOutcome, RepositoryError, Result, StampOutcome,
    StampRequest, StoreSummary, MAX_CODE_ATTEMPTS,
};

const CARD_SELECT: &str = r#"
    SELECT c.id, c.customer_id, c.template_id, c.store_id, s.name AS store_name,
           t.name AS card_name, t.reward_description, c.stamps_required,
           c.current_stamps, c.status, c.created_at, c.completed_at, c.redeemed_at
    FROM stamp_cards c
    JOIN card_templates t ON t.id = c.template_id
    JOIN stores s ON s.id = c.store_id
"#;

const REWARD_SELECT: &str = r#"
    SELECT r.id, r.card_id, r.store_id, r.customer_id, r.code,
           t.reward_description AS description, s.name AS store_name,
           r.status, r.created_at, r.redeemed_at
    FROM rewards r
    JOIN stamp_cards c ON c.id = r.card_id
    JOIN card_templates t ON t.id = c.template_id
    JOIN stores s ON s.id = r.store_id
"#;

const STORE_COLUMNS: &str =
    "id, name, owner_email, owner_phone, owner_password_hash, is_active, created_at";

const TEMPLATE_COLUMNS: &str =
    "id, store_id, name, stamps_required, reward_description, rule_kind, rule_threshold, is_active, created_at";

const TRANSACTION_COLUMNS: &str =
    "id, store_id, customer_id, card_id, reward_id, type, purchase_amount, stamps_added, created_at";

/// Ledger store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    codes: RewardCodeGenerator,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, codes: RewardCodeGenerator) -> Self {
        Self { pool, codes }
    }

    /// Insert the reward for a just-completed card, drawing a new code on collision
    async fn insert_reward(
        &self,
        tx: &mut PgTransaction<'_, Postgres>,
        card: &StampCard,
        now: DateTime<Utc>,
    ) -> Result<Reward> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let reward = Reward::issue(card, self.codes.generate(), now)?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO rewards (id, card_id, store_id, customer_id, code, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (code) DO NOTHING
                "#,
            )
            .bind(reward.id())
            .bind(reward.card_id())
            .bind(reward.store_id())
            .bind(reward.customer_id())
            .bind(reward.code())
            .bind(reward.status().as_str())
            .bind(reward.created_at())
            .execute(&mut **tx)
            .await?
            .rows_affected();

            if inserted == 1 {
                return Ok(reward);
            }

            tracing::warn!(
                "Reward code collision for card {} (attempt {}/{})",
                card.id(),
                attempt,
                MAX_CODE_ATTEMPTS
            );
        }

        Err(DomainError::DuplicateRewardCode.into())
    }

    async fn insert_transaction(
        tx: &mut PgTransaction<'_, Postgres>,
        transaction: &Transaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, store_id, customer_id, card_id, reward_id, type, purchase_amount, stamps_added, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.store_id)
        .bind(transaction.customer_id)
        .bind(transaction.card_id)
        .bind(transaction.reward_id)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.purchase_amount)
        .bind(transaction.stamps_added)
        .bind(transaction.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_api_key(
        tx: &mut PgTransaction<'_, Postgres>,
        key: &ApiKeyRecord,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, name, key_hash, role, store_id, customer_id, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(key.id)
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(key.role.as_str())
        .bind(key.store_id)
        .bind(key.customer_id)
        .bind(key.is_active)
        .bind(key.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    // =========================================================================
    // Stores and templates
    // =========================================================================

    async fn insert_store(&self, store: &StoreAccount, staff_key: &ApiKeyRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO stores (id, name, owner_email, owner_phone, owner_password_hash, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(store.id)
        .bind(&store.name)
        .bind(&store.owner_email)
        .bind(&store.owner_phone)
        .bind(&store.owner_password_hash)
        .bind(store.is_active)
        .bind(store.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| duplicate_contact(err, store.owner_contact()))?;

        Self::insert_api_key(&mut tx, staff_key).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_store(&self, store_id: Uuid) -> Result<Option<StoreAccount>> {
        let sql = format!("SELECT {} FROM stores WHERE id = $1", STORE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(store_from_row).transpose()
    }

    async fn set_store_active(&self, store_id: Uuid, active: bool) -> Result<Option<StoreAccount>> {
        let sql = format!(
            "UPDATE stores SET is_active = $2 WHERE id = $1 RETURNING {}",
            STORE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(store_id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(store_from_row).transpose()
    }

    async fn list_stores(&self) -> Result<Vec<StoreSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.name, s.owner_email, s.owner_phone, s.owner_password_hash,
                   s.is_active, s.created_at,
                   COUNT(c.id) FILTER (WHERE c.status = 'active') AS active_cards,
                   COUNT(c.id) FILTER (WHERE c.status = 'completed') AS completed_cards
            FROM stores s
            LEFT JOIN stamp_cards c ON c.store_id = s.id
            GROUP BY s.id
            ORDER BY s.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<StoreSummary> {
                Ok(StoreSummary {
                    store: store_from_row(row)?,
                    active_cards: row.try_get("active_cards")?,
                    completed_cards: row.try_get("completed_cards")?,
                })
            })
            .collect()
    }

    async fn insert_template(&self, template: &CardTemplate) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE card_templates SET is_active = FALSE WHERE store_id = $1 AND is_active")
            .bind(template.store_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO card_templates
                (id, store_id, name, stamps_required, reward_description, rule_kind, rule_threshold, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(template.id)
        .bind(template.store_id)
        .bind(&template.name)
        .bind(template.stamps_required)
        .bind(&template.reward_description)
        .bind(template.rule.kind())
        .bind(template.rule.threshold())
        .bind(template.is_active)
        .bind(template.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn current_template(&self, store_id: Uuid) -> Result<Option<CardTemplate>> {
        let sql = format!(
            "SELECT {} FROM card_templates WHERE store_id = $1 AND is_active ORDER BY created_at DESC LIMIT 1",
            TEMPLATE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(template_from_row).transpose()
    }

    // =========================================================================
    // Customers
    // =========================================================================

    async fn insert_customer(&self, customer: &Customer, key: &ApiKeyRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO customers (id, email, phone, created_at) VALUES ($1, $2, $3, $4)")
            .bind(customer.id)
            .bind(&customer.email)
            .bind(&customer.phone)
            .bind(customer.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                duplicate_contact(err, customer.email.as_deref().or(customer.phone.as_deref()))
            })?;

        Self::insert_api_key(&mut tx, key).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_customer(&self, identifier: &CustomerIdentifier) -> Result<Option<Customer>> {
        let query = match identifier {
            CustomerIdentifier::Id(id) => {
                sqlx::query("SELECT id, email, phone, created_at FROM customers WHERE id = $1")
                    .bind(*id)
            }
            CustomerIdentifier::Email(email) => {
                sqlx::query("SELECT id, email, phone, created_at FROM customers WHERE email = $1")
                    .bind(email.clone())
            }
            CustomerIdentifier::Phone(phone) => {
                sqlx::query("SELECT id, email, phone, created_at FROM customers WHERE phone = $1")
                    .bind(phone.clone())
            }
        };

        let row = query.fetch_optional(&self.pool).await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    // =========================================================================
    // Ledger mutations
    // =========================================================================

    async fn issue_stamp(&self, request: StampRequest) -> Result<StampOutcome> {
        let mut tx = self.pool.begin().await?;

        // shared lock: a concurrent deactivation waits for this issuance
        let store: Option<(String, bool)> =
            sqlx::query_as("SELECT name, is_active FROM stores WHERE id = $1 FOR SHARE")
                .bind(request.store_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (store_name, is_active) =
            store.ok_or_else(|| DomainError::StoreNotFound(request.store_id.to_string()))?;
        if !is_active {
            return Err(DomainError::StoreInactive(request.store_id.to_string()).into());
        }

        // shared lock: retiring the template waits for this issuance
        let template_active: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM card_templates WHERE id = $1 FOR SHARE")
                .bind(request.template.id)
                .fetch_optional(&mut *tx)
                .await?;
        if template_active != Some(true) {
            return Err(DomainError::CardTemplateMissing(request.store_id.to_string()).into());
        }

        let fresh = StampCard::open(request.customer_id, &request.template, &store_name, request.now);
        sqlx::query(
            r#"
            INSERT INTO stamp_cards
                (id, customer_id, template_id, store_id, stamps_required, current_stamps, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, 'active', $6)
            ON CONFLICT (customer_id, template_id) WHERE status <> 'redeemed' DO NOTHING
            "#,
        )
        .bind(fresh.id())
        .bind(fresh.customer_id())
        .bind(fresh.template_id())
        .bind(fresh.store_id())
        .bind(fresh.stamps_required())
        .bind(fresh.created_at())
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            "{} WHERE c.customer_id = $1 AND c.template_id = $2 AND c.status <> 'redeemed' FOR UPDATE OF c",
            CARD_SELECT
        );
        let row = sqlx::query(&sql)
            .bind(request.customer_id)
            .bind(request.template.id)
            .fetch_one(&mut *tx)
            .await?;
        let mut card = card_from_row(&row)?;

        let issue = card.issue(&request.template, request.purchase, request.now)?;

        sqlx::query(
            "UPDATE stamp_cards SET current_stamps = $2, status = $3, completed_at = $4 WHERE id = $1",
        )
        .bind(card.id())
        .bind(card.current_stamps())
        .bind(card.status().as_str())
        .bind(card.completed_at())
        .execute(&mut *tx)
        .await?;

        let reward = if issue.completed {
            Some(self.insert_reward(&mut tx, &card, request.now).await?)
        } else {
            None
        };

        let transaction = Transaction::stamp(
            request.store_id,
            request.customer_id,
            card.id(),
            request.purchase.map(|p| p.value()),
            issue.stamps_added,
            request.now,
        );
        Self::insert_transaction(&mut tx, &transaction).await?;

        tx.commit().await?;

        Ok(StampOutcome {
            card,
            stamps_added: issue.stamps_added,
            reward,
            transaction,
        })
    }

    async fn redeem_reward(&self, request: RedeemRequest) -> Result<RedemptionOutcome> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("{} WHERE r.code = $1 FOR UPDATE OF r", REWARD_SELECT);
        let row = sqlx::query(&sql)
            .bind(&request.code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DomainError::RewardNotFound)?;
        let mut reward = reward_from_row(&row)?;

        let sql = format!("{} WHERE c.id = $1 FOR UPDATE OF c", CARD_SELECT);
        let row = sqlx::query(&sql)
            .bind(reward.card_id())
            .fetch_one(&mut *tx)
            .await?;
        let mut card = card_from_row(&row)?;

        reward.redeem(request.store_id, request.now)?;
        card.mark_redeemed(&reward, request.now)?;

        sqlx::query("UPDATE rewards SET status = $2, redeemed_at = $3 WHERE id = $1")
            .bind(reward.id())
            .bind(reward.status().as_str())
            .bind(reward.redeemed_at())
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE stamp_cards SET status = $2, redeemed_at = $3 WHERE id = $1")
            .bind(card.id())
            .bind(card.status().as_str())
            .bind(card.redeemed_at())
            .execute(&mut *tx)
            .await?;

        let transaction = Transaction::redemption(
            request.store_id,
            reward.customer_id(),
            card.id(),
            reward.id(),
            request.now,
        );
        Self::insert_transaction(&mut tx, &transaction).await?;

        if let Some(claim) = &request.idempotency {
            let recorded = sqlx::query(
                r#"
                INSERT INTO redemption_idempotency (key, request_hash, reward_id, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (key) DO NOTHING
                "#,
            )
            .bind(claim.key)
            .bind(&claim.request_hash)
            .bind(reward.id())
            .bind(request.now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            // key already spent on another reward; dropping tx rolls back
            if recorded == 0 {
                return Err(DomainError::IdempotencyConflict.into());
            }
        }

        tx.commit().await?;

        Ok(RedemptionOutcome {
            reward,
            card,
            transaction,
        })
    }

    async fn find_idempotency(&self, key: Uuid) -> Result<Option<IdempotencyRecord>> {
        let row: Option<(Uuid, String, Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT key, request_hash, reward_id, created_at FROM redemption_idempotency WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(key, request_hash, reward_id, created_at)| IdempotencyRecord {
            key,
            request_hash,
            reward_id,
            created_at,
        }))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    async fn get_card(&self, card_id: Uuid) -> Result<Option<StampCard>> {
        let sql = format!("{} WHERE c.id = $1", CARD_SELECT);
        let row = sqlx::query(&sql)
            .bind(card_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(card_from_row).transpose()
    }

    async fn get_reward(&self, reward_id: Uuid) -> Result<Option<Reward>> {
        let sql = format!("{} WHERE r.id = $1", REWARD_SELECT);
        let row = sqlx::query(&sql)
            .bind(reward_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(reward_from_row).transpose()
    }

    async fn list_cards(&self, customer_id: Uuid) -> Result<Vec<StampCard>> {
        let sql = format!("{} WHERE c.customer_id = $1 ORDER BY c.created_at DESC", CARD_SELECT);
        let rows = sqlx::query(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(card_from_row).collect()
    }

    async fn list_rewards(&self, customer_id: Uuid) -> Result<Vec<Reward>> {
        let sql = format!("{} WHERE r.customer_id = $1 ORDER BY r.created_at DESC", REWARD_SELECT);
        let rows = sqlx::query(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(reward_from_row).collect()
    }

    async fn list_transactions(&self, store_id: Uuid, limit: usize) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE store_id = $1 ORDER BY created_at DESC LIMIT $2",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(store_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn analytics(&self, scope: AnalyticsScope, recent_limit: usize) -> Result<Analytics> {
        let store_filter = match scope {
            AnalyticsScope::Store(store_id) => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM stores WHERE id = $1)")
                        .bind(store_id)
                        .fetch_one(&self.pool)
                        .await?;
                if !exists {
                    return Err(DomainError::StoreNotFound(store_id.to_string()).into());
                }
                Some(store_id)
            }
            AnalyticsScope::Global => None,
        };

        let card_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM stamp_cards
            WHERE ($1::uuid IS NULL OR store_id = $1)
            GROUP BY status
            "#,
        )
        .bind(store_filter)
        .fetch_all(&self.pool)
        .await?;
        let cards = card_counts(card_rows)?;

        let reward_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM rewards
            WHERE ($1::uuid IS NULL OR store_id = $1)
            GROUP BY status
            "#,
        )
        .bind(store_filter)
        .fetch_all(&self.pool)
        .await?;
        let rewards = reward_counts(reward_rows)?;

        let (total_stamps_issued, total_redemptions, total_revenue): (i64, i64, Decimal) =
            sqlx::query_as(
                r#"
                SELECT
                    COALESCE(SUM(stamps_added) FILTER (WHERE type = 'stamp'), 0)::BIGINT,
                    COUNT(*) FILTER (WHERE type = 'redemption'),
                    COALESCE(SUM(purchase_amount) FILTER (WHERE type = 'stamp'), 0)
                FROM transactions
                WHERE ($1::uuid IS NULL OR store_id = $1)
                "#,
            )
            .bind(store_filter)
            .fetch_one(&self.pool)
            .await?;
        let activity = ActivityTotals {
            total_stamps_issued,
            total_redemptions,
            total_revenue,
        };

        match scope {
            AnalyticsScope::Store(store_id) => {
                let total_customers: i64 = sqlx::query_scalar(
                    "SELECT COUNT(DISTINCT customer_id) FROM stamp_cards WHERE store_id = $1",
                )
                .bind(store_id)
                .fetch_one(&self.pool)
                .await?;

                let rows = sqlx::query(
                    r#"
                    SELECT t.id, COALESCE(cu.email, cu.phone, cu.id::text) AS customer_name,
                           t.type, t.purchase_amount, t.stamps_added, t.created_at
                    FROM transactions t
                    JOIN customers cu ON cu.id = t.customer_id
                    WHERE t.store_id = $1
                    ORDER BY t.created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(store_id)
                .bind(recent_limit as i64)
                .fetch_all(&self.pool)
                .await?;

                let recent_transactions = rows
                    .iter()
                    .map(|row| -> Result<RecentTransaction> {
                        let kind: String = row.try_get("type")?;
                        Ok(RecentTransaction {
                            transaction_id: row.try_get("id")?,
                            customer_name: row.try_get("customer_name")?,
                            transaction_type: kind.parse().map_err(corrupt)?,
                            purchase_amount: row.try_get("purchase_amount")?,
                            stamps_added: row.try_get("stamps_added")?,
                            timestamp: row.try_get("created_at")?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(Analytics::Store(StoreAnalytics {
                    store_id,
                    total_customers,
                    cards,
                    redemption_rate: rewards.redemption_rate(),
                    rewards,
                    activity,
                    recent_transactions,
                }))
            }
            AnalyticsScope::Global => {
                let (total_stores, active_stores): (i64, i64) = sqlx::query_as(
                    "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM stores",
                )
                .fetch_one(&self.pool)
                .await?;

                let total_customers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
                    .fetch_one(&self.pool)
                    .await?;

                Ok(Analytics::Global(GlobalAnalytics {
                    total_stores,
                    active_stores,
                    total_customers,
                    total_cards: cards.total(),
                    cards,
                    total_rewards: rewards.total(),
                    redemption_rate: rewards.redemption_rate(),
                    rewards,
                    activity,
                }))
            }
        }
    }

    // =========================================================================
    // Access control
    // =========================================================================

    async fn upsert_api_key(&self, key: &ApiKeyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, name, key_hash, role, store_id, customer_id, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (key_hash) DO UPDATE SET
                name = EXCLUDED.name,
                role = EXCLUDED.role,
                store_id = EXCLUDED.store_id,
                customer_id = EXCLUDED.customer_id,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(key.id)
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(key.role.as_str())
        .bind(key.store_id)
        .bind(key.customer_id)
        .bind(key.is_active)
        .bind(key.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, key_hash, role, store_id, customer_id, is_active, created_at
            FROM api_keys
            WHERE key_hash = $1
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(api_key_from_row).transpose()
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn corrupt(err: DomainError) -> RepositoryError {
    RepositoryError::Corrupt(err.to_string())
}

/// Map a unique violation on a contact column to `DuplicateContact`
fn duplicate_contact(err: sqlx::Error, contact: Option<&str>) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return DomainError::DuplicateContact(contact.unwrap_or_default().to_string()).into();
        }
    }
    err.into()
}

fn store_from_row(row: &PgRow) -> Result<StoreAccount> {
    Ok(StoreAccount {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        owner_email: row.try_get("owner_email")?,
        owner_phone: row.try_get("owner_phone")?,
        owner_password_hash: row.try_get("owner_password_hash")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn template_from_row(row: &PgRow) -> Result<CardTemplate> {
    let kind: String = row.try_get("rule_kind")?;
    let threshold: Option<Decimal> = row.try_get("rule_threshold")?;

    Ok(CardTemplate {
        id: row.try_get("id")?,
        store_id: row.try_get("store_id")?,
        name: row.try_get("name")?,
        stamps_required: row.try_get("stamps_required")?,
        reward_description: row.try_get("reward_description")?,
        rule: IssuanceRule::from_parts(&kind, threshold).map_err(corrupt)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn customer_from_row(row: &PgRow) -> Result<Customer> {
    Ok(Customer {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        created_at: row.try_get("created_at")?,
    })
}

fn card_from_row(row: &PgRow) -> Result<StampCard> {
    let status: String = row.try_get("status")?;

    StampCard::from_db_state(CardSnapshot {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        template_id: row.try_get("template_id")?,
        store_id: row.try_get("store_id")?,
        store_name: row.try_get("store_name")?,
        card_name: row.try_get("card_name")?,
        reward_description: row.try_get("reward_description")?,
        stamps_required: row.try_get("stamps_required")?,
        current_stamps: row.try_get("current_stamps")?,
        status: status.parse().map_err(corrupt)?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        redeemed_at: row.try_get("redeemed_at")?,
    })
    .map_err(corrupt)
}

fn reward_from_row(row: &PgRow) -> Result<Reward> {
    let status: String = row.try_get("status")?;

    Reward::from_db_state(RewardSnapshot {
        id: row.try_get("id")?,
        card_id: row.try_get("card_id")?,
        store_id: row.try_get("store_id")?,
        customer_id: row.try_get("customer_id")?,
        code: row.try_get("code")?,
        description: row.try_get("description")?,
        store_name: row.try_get("store_name")?,
        status: status.parse().map_err(corrupt)?,
        created_at: row.try_get("created_at")?,
        redeemed_at: row.try_get("redeemed_at")?,
    })
    .map_err(corrupt)
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let kind: String = row.try_get("type")?;

    Ok(Transaction {
        id: row.try_get("id")?,
        store_id: row.try_get("store_id")?,
        customer_id: row.try_get("customer_id")?,
        card_id: row.try_get("card_id")?,
        reward_id: row.try_get("reward_id")?,
        transaction_type: kind.parse().map_err(corrupt)?,
        purchase_amount: row.try_get("purchase_amount")?,
        stamps_added: row.try_get("stamps_added")?,
        created_at: row.try_get("created_at")?,
    })
}

fn api_key_from_row(row: &PgRow) -> Result<ApiKeyRecord> {
    let role: String = row.try_get("role")?;

    Ok(ApiKeyRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        key_hash: row.try_get("key_hash")?,
        role: role.parse().map_err(corrupt)?,
        store_id: row.try_get("store_id")?,
        customer_id: row.try_get("customer_id")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn card_counts(rows: Vec<(String, i64)>) -> Result<CardCounts> {
    let mut counts = CardCounts::default();
    for (status, n) in rows {
        match status.parse::<CardStatus>().map_err(corrupt)? {
            CardStatus::Active => counts.active_cards = n,
            CardStatus::Completed => counts.completed_cards = n,
            CardStatus::Redeemed => counts.redeemed_cards = n,
        }
    }
    Ok(counts)
}

fn reward_counts(rows: Vec<(String, i64)>) -> Result<RewardCounts> {
    let mut counts = RewardCounts::default();
    for (status, n) in rows {
        match status.parse::<RewardStatus>().map_err(corrupt)? {
            RewardStatus::Available => counts.available_rewards = n,
            RewardStatus::Redeemed => counts.redeemed_rewards = n,
        }
    }
    Ok(counts)
}
