//! Scenario tests for handlers
//!
//! Run against the in-memory ledger store, so no database is required.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::aggregate::{CardStatus, RewardStatus};
    use crate::analytics::{Analytics, AnalyticsScope};
    use crate::domain::{DomainError, IssuanceRule, OperationContext, StoreAccount};
    use crate::error::AppError;
    use crate::handlers::{
        AnalyticsHandler, ConfirmRedemptionCommand, CreateCardTemplateCommand, CreateStoreCommand,
        CustomerHandler, IssueStampCommand, RedemptionHandler, RegisterCustomerCommand,
        StampHandler, StoreHandler, TemplateHandler,
    };
    use crate::repository::{LedgerStore, MemoryLedgerStore};

    struct Ledger {
        store: Arc<dyn LedgerStore>,
        ctx: OperationContext,
    }

    impl Ledger {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryLedgerStore::default()),
                ctx: OperationContext::new().with_correlation_id(Uuid::new_v4()),
            }
        }

        async fn open_store(&self, name: &str, stamps_required: i32, rule: IssuanceRule) -> StoreAccount {
            let created = StoreHandler::new(self.store.clone())
                .create(
                    CreateStoreCommand::new(name.to_string(), "correct-horse".to_string())
                        .with_owner_email(format!("owner@{}.test", name.to_lowercase().replace(' ', ""))),
                    &self.ctx,
                )
                .await
                .unwrap();

            TemplateHandler::new(self.store.clone())
                .execute(
                    CreateCardTemplateCommand::new(
                        created.store.id,
                        format!("{} Card", name),
                        stamps_required,
                        "Free coffee".to_string(),
                    )
                    .with_rule(rule),
                    &self.ctx,
                )
                .await
                .unwrap();

            created.store
        }

        async fn customer(&self, email: &str) -> Uuid {
            CustomerHandler::new(self.store.clone())
                .register(
                    RegisterCustomerCommand::default().with_email(email.to_string()),
                    &self.ctx,
                )
                .await
                .unwrap()
                .customer
                .id
        }

        async fn stamp(
            &self,
            customer: &str,
            store_id: Uuid,
            amount: Option<Decimal>,
        ) -> Result<crate::handlers::IssueStampResult, AppError> {
            let mut cmd = IssueStampCommand::new(customer.to_string(), store_id);
            cmd.purchase_amount = amount;
            StampHandler::new(self.store.clone()).execute(cmd, &self.ctx).await
        }

        async fn redeem(
            &self,
            code: &str,
            store_id: Uuid,
            key: Option<Uuid>,
        ) -> Result<crate::handlers::RedemptionResult, AppError> {
            RedemptionHandler::new(self.store.clone())
                .execute(
                    ConfirmRedemptionCommand::new(code.to_string(), store_id),
                    key,
                    &self.ctx,
                )
                .await
        }
    }

    fn domain_error(result: Result<impl std::fmt::Debug, AppError>) -> DomainError {
        match result {
            Err(AppError::Domain(err)) => err,
            other => panic!("expected domain error, got {:?}", other),
        }
    }

    // =========================================================================
    // Stamp issuance
    // =========================================================================

    #[tokio::test]
    async fn test_five_visits_complete_card() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 5, IssuanceRule::Visit).await;
        let customer_id = ledger.customer("alice@example.com").await;

        for n in 1..=4 {
            let result = ledger.stamp("alice@example.com", store.id, None).await.unwrap();
            assert_eq!(result.stamps_added, 1);
            assert_eq!(result.card.current_stamps(), n);
            assert!(result.reward.is_none());
            assert_eq!(result.message, format!("Added 1 stamp(s). {}/5 stamps", n));
        }

        let result = ledger.stamp("alice@example.com", store.id, None).await.unwrap();
        assert_eq!(result.card.current_stamps(), 5);
        assert_eq!(result.card.status(), CardStatus::Completed);
        assert_eq!(result.message, "Card completed! Reward unlocked: Free coffee");

        let rewards = ledger.store.list_rewards(customer_id).await.unwrap();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].status(), RewardStatus::Available);
        assert_eq!(Some(rewards[0].id()), result.reward.map(|r| r.id()));
    }

    #[tokio::test]
    async fn test_amount_rule_floors_purchase() {
        let ledger = Ledger::new();
        let store = ledger
            .open_store("Bagel Barn", 10, IssuanceRule::Amount { threshold: dec!(10) })
            .await;
        ledger.customer("bob@example.com").await;

        let result = ledger.stamp("bob@example.com", store.id, Some(dec!(25))).await.unwrap();
        assert_eq!(result.stamps_added, 2);
        assert_eq!(result.card.current_stamps(), 2);
    }

    #[tokio::test]
    async fn test_zero_stamp_purchase_is_still_audited() {
        let ledger = Ledger::new();
        let store = ledger
            .open_store("Bagel Barn", 10, IssuanceRule::Amount { threshold: dec!(10) })
            .await;
        ledger.customer("bob@example.com").await;

        let result = ledger.stamp("bob@example.com", store.id, Some(dec!(4.99))).await.unwrap();
        assert_eq!(result.stamps_added, 0);

        let log = ledger.store.list_transactions(store.id, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].purchase_amount, Some(dec!(4.99)));
        assert_eq!(log[0].stamps_added, 0);
    }

    #[tokio::test]
    async fn test_large_purchase_does_not_roll_over() {
        let ledger = Ledger::new();
        let store = ledger
            .open_store("Bagel Barn", 3, IssuanceRule::Amount { threshold: dec!(10) })
            .await;
        let customer_id = ledger.customer("bob@example.com").await;

        let result = ledger.stamp("bob@example.com", store.id, Some(dec!(100))).await.unwrap();
        assert_eq!(result.stamps_added, 3);
        assert!(result.reward.is_some());

        let cards = ledger.store.list_cards(customer_id).await.unwrap();
        assert_eq!(cards.len(), 1);
    }

    #[tokio::test]
    async fn test_customer_resolved_by_id_email_or_phone() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 10, IssuanceRule::Visit).await;
        let registered = CustomerHandler::new(ledger.store.clone())
            .register(
                RegisterCustomerCommand::default()
                    .with_email("Carol@Example.com".to_string())
                    .with_phone("555-0100".to_string()),
                &ledger.ctx,
            )
            .await
            .unwrap();
        let id = registered.customer.id.to_string();

        for identifier in [id.as_str(), "carol@example.com", "555 0100"] {
            ledger.stamp(identifier, store.id, None).await.unwrap();
        }

        let cards = ledger.store.list_cards(registered.customer.id).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].current_stamps(), 3);
    }

    #[tokio::test]
    async fn test_stamp_rejections() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 5, IssuanceRule::Visit).await;
        ledger.customer("alice@example.com").await;

        let err = domain_error(ledger.stamp("nobody@example.com", store.id, None).await);
        assert!(matches!(err, DomainError::CustomerNotFound(_)));

        let err = domain_error(ledger.stamp("alice@example.com", Uuid::new_v4(), None).await);
        assert!(matches!(err, DomainError::StoreNotFound(_)));

        let err = domain_error(ledger.stamp("alice@example.com", store.id, Some(dec!(-1))).await);
        assert!(matches!(err, DomainError::InvalidAmount(_)));

        let err = domain_error(ledger.stamp("alice@example.com", store.id, Some(dec!(1.005))).await);
        assert!(matches!(err, DomainError::InvalidAmount(_)));

        assert!(ledger.store.list_transactions(store.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_without_template() {
        let ledger = Ledger::new();
        let created = StoreHandler::new(ledger.store.clone())
            .create(
                CreateStoreCommand::new("Empty".to_string(), "correct-horse".to_string())
                    .with_owner_phone("555 1234".to_string()),
                &ledger.ctx,
            )
            .await
            .unwrap();
        ledger.customer("alice@example.com").await;

        let err = domain_error(ledger.stamp("alice@example.com", created.store.id, None).await);
        assert!(matches!(err, DomainError::CardTemplateMissing(_)));
    }

    #[tokio::test]
    async fn test_deactivated_store_writes_nothing() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 5, IssuanceRule::Visit).await;
        ledger.customer("alice@example.com").await;

        StoreHandler::new(ledger.store.clone())
            .set_active(store.id, false, &ledger.ctx)
            .await
            .unwrap();

        let err = domain_error(ledger.stamp("alice@example.com", store.id, None).await);
        assert!(matches!(err, DomainError::StoreInactive(_)));
        assert!(ledger.store.list_transactions(store.id, 10).await.unwrap().is_empty());

        StoreHandler::new(ledger.store.clone())
            .set_active(store.id, true, &ledger.ctx)
            .await
            .unwrap();
        assert!(ledger.stamp("alice@example.com", store.id, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_new_template_retires_previous() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 5, IssuanceRule::Visit).await;
        let customer_id = ledger.customer("alice@example.com").await;
        ledger.stamp("alice@example.com", store.id, None).await.unwrap();

        TemplateHandler::new(ledger.store.clone())
            .execute(
                CreateCardTemplateCommand::new(store.id, "Winter Card".to_string(), 3, "Free cocoa".to_string()),
                &ledger.ctx,
            )
            .await
            .unwrap();

        let result = ledger.stamp("alice@example.com", store.id, None).await.unwrap();
        assert_eq!(result.card.card_name(), "Winter Card");
        assert_eq!(result.card.current_stamps(), 1);

        // the old card stays readable
        let cards = ledger.store.list_cards(customer_id).await.unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn test_template_validation() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 5, IssuanceRule::Visit).await;
        let handler = TemplateHandler::new(ledger.store.clone());

        let zero = CreateCardTemplateCommand::new(store.id, "Card".to_string(), 0, "Prize".to_string());
        let err = domain_error(handler.execute(zero, &ledger.ctx).await);
        assert!(matches!(err, DomainError::Validation(_)));

        let bad_rule = CreateCardTemplateCommand::new(store.id, "Card".to_string(), 5, "Prize".to_string())
            .with_rule(IssuanceRule::Amount { threshold: Decimal::ZERO });
        let err = domain_error(handler.execute(bad_rule, &ledger.ctx).await);
        assert!(matches!(err, DomainError::InvalidRuleConfiguration(_)));

        // a threshold the ledger would have to round
        let fine_rule = CreateCardTemplateCommand::new(store.id, "Card".to_string(), 5, "Prize".to_string())
            .with_rule(IssuanceRule::Amount { threshold: dec!(9.999) });
        let err = domain_error(handler.execute(fine_rule, &ledger.ctx).await);
        assert!(matches!(err, DomainError::InvalidRuleConfiguration(_)));

        let no_store = CreateCardTemplateCommand::new(Uuid::new_v4(), "Card".to_string(), 5, "Prize".to_string());
        let err = domain_error(handler.execute(no_store, &ledger.ctx).await);
        assert!(matches!(err, DomainError::StoreNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stamps_complete_card_once() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 5, IssuanceRule::Visit).await;
        let customer_id = ledger.customer("alice@example.com").await;

        let handler = Arc::new(StampHandler::new(ledger.store.clone()));
        let store_id = store.id;
        let mut tasks = Vec::new();
        for _ in 0..12 {
            let handler = handler.clone();
            let ctx = ledger.ctx.clone();
            tasks.push(tokio::spawn(async move {
                handler
                    .execute(IssueStampCommand::new("alice@example.com".to_string(), store_id), &ctx)
                    .await
            }));
        }

        let mut unlocked = 0;
        for task in tasks {
            if task.await.unwrap().unwrap().reward.is_some() {
                unlocked += 1;
            }
        }
        assert_eq!(unlocked, 1);

        let cards = ledger.store.list_cards(customer_id).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].current_stamps(), 5);
        assert_eq!(cards[0].status(), CardStatus::Completed);
        assert_eq!(ledger.store.list_rewards(customer_id).await.unwrap().len(), 1);

        // every visit is on the log, including those after completion
        let log = ledger.store.list_transactions(store.id, 100).await.unwrap();
        assert_eq!(log.iter().filter(|tx| tx.reward_id.is_none()).count(), 12);
        assert_eq!(log.iter().map(|tx| tx.stamps_added).sum::<i32>(), 5);
    }

    // =========================================================================
    // Redemption
    // =========================================================================

    async fn completed_reward(ledger: &Ledger, store: &StoreAccount, email: &str) -> String {
        ledger.customer(email).await;
        ledger
            .stamp(email, store.id, None)
            .await
            .unwrap()
            .reward
            .expect("single-stamp card completes")
            .code()
            .to_string()
    }

    #[tokio::test]
    async fn test_redeem_then_new_card() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 1, IssuanceRule::Visit).await;
        let code = completed_reward(&ledger, &store, "alice@example.com").await;

        // staff may type the code in lower case
        let result = ledger.redeem(&code.to_lowercase(), store.id, None).await.unwrap();
        assert_eq!(result.reward.status(), RewardStatus::Redeemed);
        assert!(result.reward.redeemed_at().is_some());
        assert_eq!(result.card.status(), CardStatus::Redeemed);
        assert!(!result.replayed);
        assert_eq!(result.message, "Reward redeemed: Free coffee");

        let err = domain_error(ledger.redeem(&code, store.id, None).await);
        assert_eq!(err, DomainError::RewardAlreadyRedeemed);

        let next = ledger.stamp("alice@example.com", store.id, None).await.unwrap();
        assert_ne!(next.card.id(), result.card.id());
    }

    #[tokio::test]
    async fn test_unknown_and_foreign_codes_not_found() {
        let ledger = Ledger::new();
        let store_a = ledger.open_store("Store A", 1, IssuanceRule::Visit).await;
        let store_b = ledger.open_store("Store B", 1, IssuanceRule::Visit).await;
        let code_b = completed_reward(&ledger, &store_b, "alice@example.com").await;

        let err = domain_error(ledger.redeem("NOSUCHCODE", store_a.id, None).await);
        assert_eq!(err, DomainError::RewardNotFound);

        let err = domain_error(ledger.redeem(&code_b, store_a.id, None).await);
        assert_eq!(err, DomainError::RewardNotFound);

        // still redeemable where it was earned
        assert!(ledger.redeem(&code_b, store_b.id, None).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_single_winner() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 1, IssuanceRule::Visit).await;
        let code = completed_reward(&ledger, &store, "alice@example.com").await;

        let handler = Arc::new(RedemptionHandler::new(ledger.store.clone()));
        let store_id = store.id;
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let handler = handler.clone();
            let code = code.clone();
            let ctx = ledger.ctx.clone();
            tasks.push(tokio::spawn(async move {
                handler
                    .execute(ConfirmRedemptionCommand::new(code, store_id), None, &ctx)
                    .await
            }));
        }

        let mut successes = 0;
        let mut already_redeemed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::Domain(DomainError::RewardAlreadyRedeemed)) => already_redeemed += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(already_redeemed, 15);

        let redemptions = ledger
            .store
            .list_transactions(store.id, 100)
            .await
            .unwrap()
            .into_iter()
            .filter(|tx| tx.reward_id.is_some())
            .count();
        assert_eq!(redemptions, 1);
    }

    #[tokio::test]
    async fn test_idempotent_replay_and_conflict() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 1, IssuanceRule::Visit).await;
        let code = completed_reward(&ledger, &store, "alice@example.com").await;
        let other_code = completed_reward(&ledger, &store, "bob@example.com").await;
        let key = Uuid::new_v4();

        let first = ledger.redeem(&code, store.id, Some(key)).await.unwrap();
        assert!(!first.replayed);

        let retry = ledger.redeem(&code, store.id, Some(key)).await.unwrap();
        assert!(retry.replayed);
        assert_eq!(retry.reward.id(), first.reward.id());
        assert_eq!(retry.reward.redeemed_at(), first.reward.redeemed_at());

        let err = domain_error(ledger.redeem(&other_code, store.id, Some(key)).await);
        assert_eq!(err, DomainError::IdempotencyConflict);

        // a fresh key is a new attempt
        let err = domain_error(ledger.redeem(&code, store.id, Some(Uuid::new_v4())).await);
        assert_eq!(err, DomainError::RewardAlreadyRedeemed);
    }

    // =========================================================================
    // Analytics
    // =========================================================================

    #[tokio::test]
    async fn test_store_analytics() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 1, IssuanceRule::Visit).await;

        let mut codes = Vec::new();
        for email in ["a@example.com", "b@example.com", "c@example.com", "d@example.com"] {
            codes.push(completed_reward(&ledger, &store, email).await);
        }
        for code in &codes[..3] {
            ledger.redeem(code, store.id, None).await.unwrap();
        }

        let handler = AnalyticsHandler::new(ledger.store.clone(), 5);
        let analytics = match handler.execute(AnalyticsScope::Store(store.id)).await.unwrap() {
            Analytics::Store(analytics) => analytics,
            other => panic!("expected store analytics, got {:?}", other),
        };

        assert_eq!(analytics.total_customers, 4);
        assert_eq!(analytics.rewards.available_rewards, 1);
        assert_eq!(analytics.rewards.redeemed_rewards, 3);
        assert_eq!(analytics.redemption_rate, 75);
        assert_eq!(analytics.cards.completed_cards, 1);
        assert_eq!(analytics.cards.redeemed_cards, 3);
        assert_eq!(analytics.activity.total_stamps_issued, 4);
        assert_eq!(analytics.activity.total_redemptions, 3);
        assert_eq!(analytics.recent_transactions.len(), 5);
    }

    #[tokio::test]
    async fn test_analytics_without_rewards() {
        let ledger = Ledger::new();
        let store = ledger.open_store("Bean There", 5, IssuanceRule::Visit).await;
        let handler = AnalyticsHandler::new(ledger.store.clone(), 10);

        match handler.execute(AnalyticsScope::Store(store.id)).await.unwrap() {
            Analytics::Store(analytics) => assert_eq!(analytics.redemption_rate, 0),
            other => panic!("expected store analytics, got {:?}", other),
        }

        match handler.execute(AnalyticsScope::Global).await.unwrap() {
            Analytics::Global(global) => {
                assert_eq!(global.total_stores, 1);
                assert_eq!(global.active_stores, 1);
                assert_eq!(global.total_rewards, 0);
                assert_eq!(global.redemption_rate, 0);
            }
            other => panic!("expected global analytics, got {:?}", other),
        }

        let err = domain_error(handler.execute(AnalyticsScope::Store(Uuid::new_v4())).await);
        assert!(matches!(err, DomainError::StoreNotFound(_)));
    }

    // =========================================================================
    // Customers and stores
    // =========================================================================

    #[tokio::test]
    async fn test_duplicate_customer_contact() {
        let ledger = Ledger::new();
        ledger.customer("alice@example.com").await;

        let result = CustomerHandler::new(ledger.store.clone())
            .register(
                RegisterCustomerCommand::default().with_email("ALICE@example.com".to_string()),
                &ledger.ctx,
            )
            .await;
        assert!(matches!(domain_error(result), DomainError::DuplicateContact(_)));
    }

    #[tokio::test]
    async fn test_list_cards_unknown_customer() {
        let ledger = Ledger::new();
        let result = CustomerHandler::new(ledger.store.clone())
            .list_cards(Uuid::new_v4())
            .await;
        assert!(matches!(domain_error(result), DomainError::CustomerNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_store_validation_and_listing() {
        let ledger = Ledger::new();
        let handler = StoreHandler::new(ledger.store.clone());

        let short = CreateStoreCommand::new("Shop".to_string(), "short".to_string())
            .with_owner_email("o@shop.test".to_string());
        assert!(matches!(
            domain_error(handler.create(short, &ledger.ctx).await),
            DomainError::Validation(_)
        ));

        let no_contact = CreateStoreCommand::new("Shop".to_string(), "long-enough".to_string());
        assert!(matches!(
            domain_error(handler.create(no_contact, &ledger.ctx).await),
            DomainError::Validation(_)
        ));

        let store = ledger.open_store("Bean There", 2, IssuanceRule::Visit).await;
        ledger.customer("alice@example.com").await;
        ledger.stamp("alice@example.com", store.id, None).await.unwrap();

        let stores = handler.list().await.unwrap();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].store.id, store.id);
        assert_eq!(stores[0].active_cards, 1);
        assert_eq!(stores[0].completed_cards, 0);
        assert!(stores[0].store.owner_password_hash.starts_with("$argon2id$"));
    }
}
