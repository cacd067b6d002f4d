//! Store Handler
//!
//! Store onboarding and lifecycle for the admin portal.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::identifier::{normalize_email, normalize_phone};
use crate::domain::{DomainError, OperationContext, Role, StoreAccount};
use crate::error::AppError;
use crate::repository::{LedgerStore, StoreSummary};

use super::credentials::{hash_password, IssuedApiKey, MIN_PASSWORD_LENGTH};
use super::{CreateStoreCommand, CreateStoreResult};

// =========================================================================
// StoreHandler
// =========================================================================

/// Handler for store management
pub struct StoreHandler {
    store: Arc<dyn LedgerStore>,
}

impl StoreHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Create a store and issue its staff API key
    pub async fn create(
        &self,
        command: CreateStoreCommand,
        context: &OperationContext,
    ) -> Result<CreateStoreResult, AppError> {
        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("store name is required").into());
        }

        let (owner_email, owner_phone) =
            normalize_contacts(command.owner_email.as_deref(), command.owner_phone.as_deref())?;

        if command.owner_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(DomainError::validation(format!(
                "owner password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            ))
            .into());
        }
        let owner_password_hash = hash_password(&command.owner_password)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))?;

        let now = Utc::now();
        let store = StoreAccount {
            id: Uuid::new_v4(),
            name,
            owner_email,
            owner_phone,
            owner_password_hash,
            is_active: true,
            created_at: now,
        };

        let staff_key = IssuedApiKey::generate(
            format!("{} staff", store.name),
            Role::Staff,
            Some(store.id),
            None,
            now,
        );

        self.store.insert_store(&store, &staff_key.record).await?;

        tracing::info!(
            store_id = %store.id,
            name = %store.name,
            api_key_id = ?context.api_key_id,
            role = ?context.role,
            correlation_id = ?context.correlation_id,
            "Store created"
        );

        Ok(CreateStoreResult {
            store,
            api_key: staff_key.secret,
        })
    }

    /// Every store with its open card counts
    pub async fn list(&self) -> Result<Vec<StoreSummary>, AppError> {
        Ok(self.store.list_stores().await?)
    }

    /// Activate or deactivate a store
    pub async fn set_active(
        &self,
        store_id: Uuid,
        active: bool,
        context: &OperationContext,
    ) -> Result<StoreAccount, AppError> {
        let store = self
            .store
            .set_store_active(store_id, active)
            .await?
            .ok_or_else(|| DomainError::StoreNotFound(store_id.to_string()))?;

        tracing::info!(
            store_id = %store.id,
            active,
            api_key_id = ?context.api_key_id,
            role = ?context.role,
            correlation_id = ?context.correlation_id,
            "Store status changed"
        );

        Ok(store)
    }
}

/// Normalize an email/phone pair; at least one must be present
pub(super) fn normalize_contacts(
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<(Option<String>, Option<String>), DomainError> {
    let email = email.map(normalize_email).filter(|e| !e.is_empty());
    let phone = phone.map(normalize_phone).filter(|p| !p.is_empty());

    if let Some(email) = &email {
        if !email.contains('@') {
            return Err(DomainError::validation(format!("invalid email '{}'", email)));
        }
    }
    if let Some(phone) = &phone {
        if phone.contains('@') {
            return Err(DomainError::validation(format!("invalid phone '{}'", phone)));
        }
    }
    if email.is_none() && phone.is_none() {
        return Err(DomainError::validation("an email or phone number is required"));
    }

    Ok((email, phone))
}
