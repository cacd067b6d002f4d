//! In-memory ledger store
//!
//! All state lives behind one `RwLock`. Every mutation holds the write guard
//! for its whole read-check-write sequence, which serializes redemptions per
//! code and stamp issuance per card. Used by tests and `STORAGE_BACKEND=memory`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::{Reward, StampCard};
use crate::analytics::{
    ActivityTotals, Analytics, AnalyticsScope, CardCounts, GlobalAnalytics, RecentTransaction,
    RewardCounts, StoreAnalytics,
};
use crate::domain::{
    ApiKeyRecord, CardTemplate, Customer, CustomerIdentifier, DomainError, IdempotencyRecord,
    RewardCodeGenerator, StoreAccount, Transaction,
};

use super::{
    LedgerStore, RedeemRequest, RedemptionOutcome, RepositoryError, Result, StampOutcome,
    StampRequest, StoreSummary, MAX_CODE_ATTEMPTS,
};

#[derive(Default)]
struct MemoryState {
    stores: HashMap<Uuid, StoreAccount>,
    templates: HashMap<Uuid, CardTemplate>,
    customers: HashMap<Uuid, Customer>,
    cards: HashMap<Uuid, StampCard>,
    rewards: HashMap<Uuid, Reward>,
    reward_codes: HashMap<String, Uuid>,
    transactions: Vec<Transaction>,
    api_keys: HashMap<String, ApiKeyRecord>,
    idempotency: HashMap<Uuid, IdempotencyRecord>,
}

impl MemoryState {
    fn open_card_id(&self, customer_id: Uuid, template_id: Uuid) -> Option<Uuid> {
        self.cards
            .values()
            .find(|card| {
                card.customer_id() == customer_id
                    && card.template_id() == template_id
                    && !card.is_redeemed()
            })
            .map(|card| card.id())
    }

    fn unused_code(&self, codes: &RewardCodeGenerator) -> Result<String> {
        (0..MAX_CODE_ATTEMPTS)
            .map(|_| codes.generate())
            .find(|code| !self.reward_codes.contains_key(code))
            .ok_or(RepositoryError::Domain(DomainError::DuplicateRewardCode))
    }

    fn contact_taken(&self, customer: &Customer) -> Option<String> {
        self.customers.values().find_map(|existing| {
            if customer.email.is_some() && existing.email == customer.email {
                customer.email.clone()
            } else if customer.phone.is_some() && existing.phone == customer.phone {
                customer.phone.clone()
            } else {
                None
            }
        })
    }

    fn owner_contact_taken(&self, store: &StoreAccount) -> Option<String> {
        self.stores.values().find_map(|existing| {
            if store.owner_email.is_some() && existing.owner_email == store.owner_email {
                store.owner_email.clone()
            } else if store.owner_phone.is_some() && existing.owner_phone == store.owner_phone {
                store.owner_phone.clone()
            } else {
                None
            }
        })
    }

    fn recent_transactions(&self, store_id: Uuid, limit: usize) -> Vec<RecentTransaction> {
        self.transactions
            .iter()
            .rev()
            .filter(|tx| tx.store_id == store_id)
            .take(limit)
            .map(|tx| RecentTransaction {
                transaction_id: tx.id,
                customer_name: self
                    .customers
                    .get(&tx.customer_id)
                    .map(Customer::display_name)
                    .unwrap_or_else(|| tx.customer_id.to_string()),
                transaction_type: tx.transaction_type,
                purchase_amount: tx.purchase_amount,
                stamps_added: tx.stamps_added,
                timestamp: tx.created_at,
            })
            .collect()
    }
}

/// Ledger store kept in process memory
pub struct MemoryLedgerStore {
    state: RwLock<MemoryState>,
    codes: RewardCodeGenerator,
}

impl MemoryLedgerStore {
    pub fn new(codes: RewardCodeGenerator) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            codes,
        }
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new(RewardCodeGenerator::default())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_store(&self, store: &StoreAccount, staff_key: &ApiKeyRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(contact) = state.owner_contact_taken(store) {
            return Err(DomainError::DuplicateContact(contact).into());
        }
        state.stores.insert(store.id, store.clone());
        state.api_keys.insert(staff_key.key_hash.clone(), staff_key.clone());
        Ok(())
    }

    async fn get_store(&self, store_id: Uuid) -> Result<Option<StoreAccount>> {
        Ok(self.state.read().await.stores.get(&store_id).cloned())
    }

    async fn set_store_active(&self, store_id: Uuid, active: bool) -> Result<Option<StoreAccount>> {
        let mut state = self.state.write().await;
        Ok(state.stores.get_mut(&store_id).map(|store| {
            store.is_active = active;
            store.clone()
        }))
    }

    async fn list_stores(&self) -> Result<Vec<StoreSummary>> {
        let state = self.state.read().await;
        let mut stores: Vec<StoreSummary> = state
            .stores
            .values()
            .map(|store| {
                let counts = CardCounts::tally(
                    state
                        .cards
                        .values()
                        .filter(|card| card.store_id() == store.id)
                        .map(StampCard::status),
                );
                StoreSummary {
                    store: store.clone(),
                    active_cards: counts.active_cards,
                    completed_cards: counts.completed_cards,
                }
            })
            .collect();
        stores.sort_by(|a, b| b.store.created_at.cmp(&a.store.created_at));
        Ok(stores)
    }

    async fn insert_template(&self, template: &CardTemplate) -> Result<()> {
        let mut state = self.state.write().await;
        for existing in state.templates.values_mut() {
            if existing.store_id == template.store_id {
                existing.is_active = false;
            }
        }
        state.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn current_template(&self, store_id: Uuid) -> Result<Option<CardTemplate>> {
        let state = self.state.read().await;
        Ok(state
            .templates
            .values()
            .filter(|t| t.store_id == store_id && t.is_active)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn insert_customer(&self, customer: &Customer, key: &ApiKeyRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(contact) = state.contact_taken(customer) {
            return Err(DomainError::DuplicateContact(contact).into());
        }
        state.customers.insert(customer.id, customer.clone());
        state.api_keys.insert(key.key_hash.clone(), key.clone());
        Ok(())
    }

    async fn find_customer(&self, identifier: &CustomerIdentifier) -> Result<Option<Customer>> {
        let state = self.state.read().await;
        let found = match identifier {
            CustomerIdentifier::Id(id) => state.customers.get(id),
            CustomerIdentifier::Email(email) => state
                .customers
                .values()
                .find(|c| c.email.as_deref() == Some(email.as_str())),
            CustomerIdentifier::Phone(phone) => state
                .customers
                .values()
                .find(|c| c.phone.as_deref() == Some(phone.as_str())),
        };
        Ok(found.cloned())
    }

    async fn issue_stamp(&self, request: StampRequest) -> Result<StampOutcome> {
        let mut state = self.state.write().await;

        let store = state
            .stores
            .get(&request.store_id)
            .ok_or_else(|| DomainError::StoreNotFound(request.store_id.to_string()))?;
        if !store.is_active {
            return Err(DomainError::StoreInactive(request.store_id.to_string()).into());
        }
        let store_name = store.name.clone();

        // the template may have been retired since the caller looked it up
        let template_active = state
            .templates
            .get(&request.template.id)
            .is_some_and(|template| template.is_active);
        if !template_active {
            return Err(DomainError::CardTemplateMissing(request.store_id.to_string()).into());
        }

        // work on a copy so a failure below leaves the state untouched
        let mut card = match state.open_card_id(request.customer_id, request.template.id) {
            Some(card_id) => state
                .cards
                .get(&card_id)
                .cloned()
                .ok_or_else(|| RepositoryError::Corrupt(format!("card {} vanished", card_id)))?,
            None => StampCard::open(request.customer_id, &request.template, &store_name, request.now),
        };

        let issue = card.issue(&request.template, request.purchase, request.now)?;

        let reward = if issue.completed {
            let code = state.unused_code(&self.codes)?;
            Some(Reward::issue(&card, code, request.now)?)
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

        if let Some(reward) = &reward {
            state.reward_codes.insert(reward.code().to_string(), reward.id());
            state.rewards.insert(reward.id(), reward.clone());
        }
        state.cards.insert(card.id(), card.clone());
        state.transactions.push(transaction.clone());

        Ok(StampOutcome {
            card,
            stamps_added: issue.stamps_added,
            reward,
            transaction,
        })
    }

    async fn redeem_reward(&self, request: RedeemRequest) -> Result<RedemptionOutcome> {
        let mut state = self.state.write().await;

        // a key already spent on an earlier redemption is never rebound
        if let Some(claim) = &request.idempotency {
            if state.idempotency.contains_key(&claim.key) {
                return Err(DomainError::IdempotencyConflict.into());
            }
        }

        let reward_id = *state
            .reward_codes
            .get(&request.code)
            .ok_or(DomainError::RewardNotFound)?;
        let mut reward = state
            .rewards
            .get(&reward_id)
            .cloned()
            .ok_or_else(|| RepositoryError::Corrupt(format!("reward {} vanished", reward_id)))?;
        let mut card = state
            .cards
            .get(&reward.card_id())
            .cloned()
            .ok_or_else(|| {
                RepositoryError::Corrupt(format!("reward {} has no card", reward_id))
            })?;

        reward.redeem(request.store_id, request.now)?;
        card.mark_redeemed(&reward, request.now)?;

        let transaction = Transaction::redemption(
            request.store_id,
            reward.customer_id(),
            card.id(),
            reward.id(),
            request.now,
        );

        if let Some(claim) = request.idempotency {
            state.idempotency.insert(
                claim.key,
                IdempotencyRecord {
                    key: claim.key,
                    request_hash: claim.request_hash,
                    reward_id: reward.id(),
                    created_at: request.now,
                },
            );
        }
        state.rewards.insert(reward.id(), reward.clone());
        state.cards.insert(card.id(), card.clone());
        state.transactions.push(transaction.clone());

        Ok(RedemptionOutcome {
            reward,
            card,
            transaction,
        })
    }

    async fn find_idempotency(&self, key: Uuid) -> Result<Option<IdempotencyRecord>> {
        Ok(self.state.read().await.idempotency.get(&key).cloned())
    }

    async fn get_card(&self, card_id: Uuid) -> Result<Option<StampCard>> {
        Ok(self.state.read().await.cards.get(&card_id).cloned())
    }

    async fn get_reward(&self, reward_id: Uuid) -> Result<Option<Reward>> {
        Ok(self.state.read().await.rewards.get(&reward_id).cloned())
    }

    async fn list_cards(&self, customer_id: Uuid) -> Result<Vec<StampCard>> {
        let state = self.state.read().await;
        let mut cards: Vec<StampCard> = state
            .cards
            .values()
            .filter(|card| card.customer_id() == customer_id)
            .cloned()
            .collect();
        cards.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(cards)
    }

    async fn list_rewards(&self, customer_id: Uuid) -> Result<Vec<Reward>> {
        let state = self.state.read().await;
        let mut rewards: Vec<Reward> = state
            .rewards
            .values()
            .filter(|reward| reward.customer_id() == customer_id)
            .cloned()
            .collect();
        rewards.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(rewards)
    }

    async fn list_transactions(&self, store_id: Uuid, limit: usize) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.store_id == store_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn analytics(&self, scope: AnalyticsScope, recent_limit: usize) -> Result<Analytics> {
        let state = self.state.read().await;

        match scope {
            AnalyticsScope::Store(store_id) => {
                if !state.stores.contains_key(&store_id) {
                    return Err(DomainError::StoreNotFound(store_id.to_string()).into());
                }

                let cards: Vec<&StampCard> = state
                    .cards
                    .values()
                    .filter(|card| card.store_id() == store_id)
                    .collect();
                let customers: HashSet<Uuid> = cards.iter().map(|card| card.customer_id()).collect();
                let rewards = RewardCounts::tally(
                    state
                        .rewards
                        .values()
                        .filter(|reward| reward.store_id() == store_id)
                        .map(Reward::status),
                );

                Ok(Analytics::Store(StoreAnalytics {
                    store_id,
                    total_customers: customers.len() as i64,
                    cards: CardCounts::tally(cards.iter().map(|card| card.status())),
                    redemption_rate: rewards.redemption_rate(),
                    rewards,
                    activity: ActivityTotals::tally(
                        state.transactions.iter().filter(|tx| tx.store_id == store_id),
                    ),
                    recent_transactions: state.recent_transactions(store_id, recent_limit),
                }))
            }
            AnalyticsScope::Global => {
                let cards = CardCounts::tally(state.cards.values().map(StampCard::status));
                let rewards = RewardCounts::tally(state.rewards.values().map(Reward::status));

                Ok(Analytics::Global(GlobalAnalytics {
                    total_stores: state.stores.len() as i64,
                    active_stores: state.stores.values().filter(|s| s.is_active).count() as i64,
                    total_customers: state.customers.len() as i64,
                    total_cards: cards.total(),
                    cards,
                    total_rewards: rewards.total(),
                    redemption_rate: rewards.redemption_rate(),
                    rewards,
                    activity: ActivityTotals::tally(&state.transactions),
                }))
            }
        }
    }

    async fn upsert_api_key(&self, key: &ApiKeyRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.api_keys.insert(key.key_hash.clone(), key.clone());
        Ok(())
    }

    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        Ok(self.state.read().await.api_keys.get(key_hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{CardStatus, RewardStatus};
    use crate::domain::{IssuanceRule, Role};
    use crate::repository::IdempotencyClaim;
    use chrono::Utc;

    fn store() -> StoreAccount {
        StoreAccount {
            id: Uuid::new_v4(),
            name: "Bean There".to_string(),
            owner_email: Some("owner@beanthere.test".to_string()),
            owner_phone: None,
            owner_password_hash: "hash".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn key(role: Role) -> ApiKeyRecord {
        ApiKeyRecord {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            key_hash: Uuid::new_v4().to_string(),
            role,
            store_id: None,
            customer_id: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn template(store_id: Uuid, stamps_required: i32) -> CardTemplate {
        CardTemplate {
            id: Uuid::new_v4(),
            store_id,
            name: "Coffee Card".to_string(),
            stamps_required,
            reward_description: "Free coffee".to_string(),
            rule: IssuanceRule::Visit,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn stamp(store_id: Uuid, customer_id: Uuid, template: &CardTemplate) -> StampRequest {
        StampRequest {
            customer_id,
            store_id,
            template: template.clone(),
            purchase: None,
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_template_retirement() {
        let repo = MemoryLedgerStore::default();
        let store = store();
        repo.insert_store(&store, &key(Role::Staff)).await.unwrap();

        let first = template(store.id, 5);
        repo.insert_template(&first).await.unwrap();
        let second = CardTemplate {
            created_at: first.created_at + chrono::Duration::seconds(1),
            ..template(store.id, 8)
        };
        repo.insert_template(&second).await.unwrap();

        let current = repo.current_template(store.id).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
        assert_eq!(current.stamps_required, 8);
    }

    #[tokio::test]
    async fn test_duplicate_contact_rejected() {
        let repo = MemoryLedgerStore::default();
        let customer = Customer {
            id: Uuid::new_v4(),
            email: Some("alice@example.com".to_string()),
            phone: None,
            created_at: Utc::now(),
        };
        repo.insert_customer(&customer, &key(Role::Customer)).await.unwrap();

        let twin = Customer { id: Uuid::new_v4(), ..customer };
        let result = repo.insert_customer(&twin, &key(Role::Customer)).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Domain(DomainError::DuplicateContact(_)))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_owner_contact_rejected() {
        let repo = MemoryLedgerStore::default();
        let first = store();
        repo.insert_store(&first, &key(Role::Staff)).await.unwrap();

        let twin = StoreAccount {
            id: Uuid::new_v4(),
            name: "Bean Here".to_string(),
            ..first.clone()
        };
        let result = repo.insert_store(&twin, &key(Role::Staff)).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Domain(DomainError::DuplicateContact(_)))
        ));

        let by_phone = StoreAccount {
            id: Uuid::new_v4(),
            owner_email: None,
            owner_phone: Some("5550100".to_string()),
            ..first.clone()
        };
        repo.insert_store(&by_phone, &key(Role::Staff)).await.unwrap();
        let phone_twin = StoreAccount { id: Uuid::new_v4(), ..by_phone };
        assert!(repo.insert_store(&phone_twin, &key(Role::Staff)).await.is_err());

        let stores = repo.list_stores().await.unwrap();
        assert_eq!(stores.len(), 2);
    }

    #[tokio::test]
    async fn test_spent_idempotency_key_not_rebound() {
        let repo = MemoryLedgerStore::default();
        let store = store();
        repo.insert_store(&store, &key(Role::Staff)).await.unwrap();
        let template = template(store.id, 1);
        repo.insert_template(&template).await.unwrap();

        let mut codes = Vec::new();
        for _ in 0..2 {
            let outcome = repo.issue_stamp(stamp(store.id, Uuid::new_v4(), &template)).await.unwrap();
            codes.push(outcome.reward.expect("one-stamp card completes"));
        }

        let claim = IdempotencyClaim {
            key: Uuid::new_v4(),
            request_hash: "first".to_string(),
        };
        let redeem = |reward: &Reward, hash: &str| RedeemRequest {
            code: reward.code().to_string(),
            store_id: store.id,
            idempotency: Some(IdempotencyClaim {
                key: claim.key,
                request_hash: hash.to_string(),
            }),
            now: Utc::now(),
        };

        repo.redeem_reward(redeem(&codes[0], "first")).await.unwrap();
        let result = repo.redeem_reward(redeem(&codes[1], "second")).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Domain(DomainError::IdempotencyConflict))
        ));

        let record = repo.find_idempotency(claim.key).await.unwrap().unwrap();
        assert_eq!(record.reward_id, codes[0].id());
        assert_eq!(record.request_hash, claim.request_hash);

        // the second reward is untouched
        let second = repo.get_reward(codes[1].id()).await.unwrap().unwrap();
        assert_eq!(second.status(), RewardStatus::Available);
    }

    #[tokio::test]
    async fn test_retired_template_rejected_at_issue() {
        let repo = MemoryLedgerStore::default();
        let store = store();
        repo.insert_store(&store, &key(Role::Staff)).await.unwrap();
        let stale = template(store.id, 5);
        repo.insert_template(&stale).await.unwrap();
        let current = CardTemplate {
            created_at: stale.created_at + chrono::Duration::seconds(1),
            ..template(store.id, 3)
        };
        repo.insert_template(&current).await.unwrap();

        // looked up before the new template replaced it
        let result = repo.issue_stamp(stamp(store.id, Uuid::new_v4(), &stale)).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Domain(DomainError::CardTemplateMissing(_)))
        ));
        assert!(repo.list_transactions(store.id, 10).await.unwrap().is_empty());

        let customer_id = Uuid::new_v4();
        let outcome = repo.issue_stamp(stamp(store.id, customer_id, &current)).await.unwrap();
        assert_eq!(outcome.card.template_id(), current.id);
    }

    #[tokio::test]
    async fn test_completed_card_then_new_card_after_redemption() {
        let repo = MemoryLedgerStore::default();
        let store = store();
        repo.insert_store(&store, &key(Role::Staff)).await.unwrap();
        let template = template(store.id, 2);
        repo.insert_template(&template).await.unwrap();
        let customer_id = Uuid::new_v4();

        repo.issue_stamp(stamp(store.id, customer_id, &template)).await.unwrap();
        let outcome = repo.issue_stamp(stamp(store.id, customer_id, &template)).await.unwrap();
        let reward = outcome.reward.expect("second stamp completes the card");
        assert_eq!(outcome.card.status(), CardStatus::Completed);

        // completed but unredeemed: visit recorded, nothing added
        let extra = repo.issue_stamp(stamp(store.id, customer_id, &template)).await.unwrap();
        assert_eq!(extra.stamps_added, 0);
        assert!(extra.reward.is_none());
        assert_eq!(extra.card.id(), outcome.card.id());

        repo.redeem_reward(RedeemRequest {
            code: reward.code().to_string(),
            store_id: store.id,
            idempotency: None,
            now: Utc::now(),
        })
        .await
        .unwrap();

        let fresh = repo.issue_stamp(stamp(store.id, customer_id, &template)).await.unwrap();
        assert_ne!(fresh.card.id(), outcome.card.id());
        assert_eq!(fresh.card.current_stamps(), 1);

        let cards = repo.list_cards(customer_id).await.unwrap();
        assert_eq!(cards.len(), 2);
        let rewards = repo.list_rewards(customer_id).await.unwrap();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].status(), RewardStatus::Redeemed);

        let log = repo.list_transactions(store.id, 100).await.unwrap();
        assert_eq!(log.len(), 5);
    }

    #[tokio::test]
    async fn test_inactive_store_writes_nothing() {
        let repo = MemoryLedgerStore::default();
        let mut store = store();
        store.is_active = false;
        repo.insert_store(&store, &key(Role::Staff)).await.unwrap();
        let template = template(store.id, 2);
        repo.insert_template(&template).await.unwrap();

        let result = repo.issue_stamp(stamp(store.id, Uuid::new_v4(), &template)).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Domain(DomainError::StoreInactive(_)))
        ));
        assert!(repo.list_transactions(store.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analytics_unknown_store() {
        let repo = MemoryLedgerStore::default();
        let result = repo.analytics(AnalyticsScope::Store(Uuid::new_v4()), 10).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Domain(DomainError::StoreNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_api_key_lookup() {
        let repo = MemoryLedgerStore::default();
        let admin = key(Role::Admin);
        repo.upsert_api_key(&admin).await.unwrap();

        let found = repo.find_api_key(&admin.key_hash).await.unwrap().unwrap();
        assert_eq!(found.id, admin.id);
        assert!(repo.find_api_key("missing").await.unwrap().is_none());
    }
}
