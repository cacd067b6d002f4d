//! Card Template Handler
//!
//! Publishes a store's stamp card. The new template replaces the store's
//! previous one for future stamps.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{CardTemplate, DomainError, OperationContext};
use crate::error::AppError;
use crate::repository::LedgerStore;

use super::{CreateCardTemplateCommand, CreateCardTemplateResult};

/// Handler for card template creation
pub struct TemplateHandler {
    store: Arc<dyn LedgerStore>,
}

impl TemplateHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Execute the create card template command
    pub async fn execute(
        &self,
        command: CreateCardTemplateCommand,
        context: &OperationContext,
    ) -> Result<CreateCardTemplateResult, AppError> {
        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("card name is required").into());
        }
        let reward_description = command.reward_description.trim().to_string();
        if reward_description.is_empty() {
            return Err(DomainError::validation("reward description is required").into());
        }
        if command.stamps_required < 1 {
            return Err(DomainError::validation(format!(
                "stampsRequired must be at least 1 (got {})",
                command.stamps_required
            ))
            .into());
        }
        command.rule.validate()?;

        let store = self
            .store
            .get_store(command.store_id)
            .await?
            .ok_or_else(|| DomainError::StoreNotFound(command.store_id.to_string()))?;

        let template = CardTemplate {
            id: Uuid::new_v4(),
            store_id: store.id,
            name,
            stamps_required: command.stamps_required,
            reward_description,
            rule: command.rule,
            is_active: true,
            created_at: Utc::now(),
        };

        self.store.insert_template(&template).await?;

        tracing::info!(
            store_id = %store.id,
            template_id = %template.id,
            stamps_required = template.stamps_required,
            rule = template.rule.kind(),
            api_key_id = ?context.api_key_id,
            role = ?context.role,
            correlation_id = ?context.correlation_id,
            "Card template created"
        );

        Ok(CreateCardTemplateResult { template })
    }
}
