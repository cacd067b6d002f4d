//! Stamp Handler
//!
//! Records a visit or purchase against the customer's card at a store.

use chrono::Utc;
use std::sync::Arc;

use crate::domain::{CustomerIdentifier, DomainError, OperationContext, PurchaseAmount};
use crate::error::AppError;
use crate::repository::{LedgerStore, StampOutcome, StampRequest};

use super::{IssueStampCommand, IssueStampResult};

// =========================================================================
// StampHandler
// =========================================================================

/// Handler for stamp issuance
pub struct StampHandler {
    store: Arc<dyn LedgerStore>,
}

impl StampHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Execute the issue stamp command
    pub async fn execute(
        &self,
        command: IssueStampCommand,
        context: &OperationContext,
    ) -> Result<IssueStampResult, AppError> {
        let identifier = CustomerIdentifier::parse(&command.customer_identifier)?;
        let purchase = command
            .purchase_amount
            .map(PurchaseAmount::new)
            .transpose()
            .map_err(DomainError::from)?;

        let store = self
            .store
            .get_store(command.store_id)
            .await?
            .ok_or_else(|| DomainError::StoreNotFound(command.store_id.to_string()))?;
        if !store.is_active {
            return Err(DomainError::StoreInactive(store.id.to_string()).into());
        }

        let template = self
            .store
            .current_template(store.id)
            .await?
            .ok_or_else(|| DomainError::CardTemplateMissing(store.id.to_string()))?;

        let customer = self
            .store
            .find_customer(&identifier)
            .await?
            .ok_or_else(|| DomainError::CustomerNotFound(identifier.to_string()))?;

        let outcome = self
            .store
            .issue_stamp(StampRequest {
                customer_id: customer.id,
                store_id: store.id,
                template,
                purchase,
                now: Utc::now(),
            })
            .await?;

        tracing::info!(
            store_id = %store.id,
            customer_id = %customer.id,
            card_id = %outcome.card.id(),
            stamps_added = outcome.stamps_added,
            completed = outcome.reward.is_some(),
            api_key_id = ?context.api_key_id,
            role = ?context.role,
            correlation_id = ?context.correlation_id,
            "Stamp issued"
        );

        let message = stamp_message(&outcome);
        Ok(IssueStampResult {
            card: outcome.card,
            stamps_added: outcome.stamps_added,
            reward: outcome.reward,
            message,
        })
    }
}

/// Message shown to staff after an issuance
fn stamp_message(outcome: &StampOutcome) -> String {
    match &outcome.reward {
        Some(reward) => format!("Card completed! Reward unlocked: {}", reward.description()),
        None => format!(
            "Added {} stamp(s). {}/{} stamps",
            outcome.stamps_added,
            outcome.card.current_stamps(),
            outcome.card.stamps_required()
        ),
    }
}
