//! Redemption Handler
//!
//! Confirms a reward redemption at the acting store, optionally guarded by
//! an `Idempotency-Key`.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::Reward;
use crate::domain::reward_code::normalize_code;
use crate::domain::{DomainError, IdempotencyRecord, OperationContext};
use crate::error::AppError;
use crate::repository::{IdempotencyClaim, LedgerStore, RedeemRequest, RepositoryError};

use super::{ConfirmRedemptionCommand, RedemptionResult};

// =========================================================================
// RedemptionHandler
// =========================================================================

/// Handler for reward redemption
pub struct RedemptionHandler {
    store: Arc<dyn LedgerStore>,
}

impl RedemptionHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Execute the confirm redemption command
    pub async fn execute(
        &self,
        command: ConfirmRedemptionCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<RedemptionResult, AppError> {
        let code = normalize_code(&command.reward_code);
        if code.is_empty() {
            return Err(DomainError::validation("reward code is required").into());
        }

        let claim = idempotency_key.map(|key| IdempotencyClaim {
            key,
            request_hash: request_hash(command.store_id, &code),
        });

        if let Some(claim) = &claim {
            if let Some(record) = self.store.find_idempotency(claim.key).await? {
                return self.replay(claim, record).await;
            }
        }

        let result = self
            .store
            .redeem_reward(RedeemRequest {
                code,
                store_id: command.store_id,
                idempotency: claim.clone(),
                now: Utc::now(),
            })
            .await;

        let outcome = match (result, &claim) {
            (Ok(outcome), _) => outcome,
            // a concurrent request with the same key may have won the race
            (
                Err(RepositoryError::Domain(
                    err @ (DomainError::RewardAlreadyRedeemed | DomainError::IdempotencyConflict),
                )),
                Some(claim),
            ) => match self.store.find_idempotency(claim.key).await? {
                Some(record) => return self.replay(claim, record).await,
                None => return Err(err.into()),
            },
            (Err(err), _) => return Err(err.into()),
        };

        tracing::info!(
            store_id = %command.store_id,
            reward_id = %outcome.reward.id(),
            card_id = %outcome.card.id(),
            customer_id = %outcome.reward.customer_id(),
            api_key_id = ?context.api_key_id,
            role = ?context.role,
            correlation_id = ?context.correlation_id,
            "Reward redeemed"
        );

        Ok(RedemptionResult {
            message: redeemed_message(&outcome.reward),
            reward: outcome.reward,
            card: outcome.card,
            replayed: false,
        })
    }

    /// Answer a retried request from its idempotency record
    async fn replay(
        &self,
        claim: &IdempotencyClaim,
        record: IdempotencyRecord,
    ) -> Result<RedemptionResult, AppError> {
        if record.request_hash != claim.request_hash {
            return Err(DomainError::IdempotencyConflict.into());
        }

        let reward = self
            .store
            .get_reward(record.reward_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "idempotency record points at missing reward {}",
                    record.reward_id
                ))
            })?;
        let card = self
            .store
            .get_card(reward.card_id())
            .await?
            .ok_or_else(|| AppError::Internal(format!("reward {} has no card", reward.id())))?;

        tracing::debug!(
            idempotency_key = %claim.key,
            reward_id = %reward.id(),
            "Redemption replayed"
        );

        Ok(RedemptionResult {
            message: redeemed_message(&reward),
            reward,
            card,
            replayed: true,
        })
    }
}

fn redeemed_message(reward: &Reward) -> String {
    format!("Reward redeemed: {}", reward.description())
}

/// Fingerprint of a redemption request for idempotency checks
fn request_hash(store_id: Uuid, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(store_id.as_bytes());
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
