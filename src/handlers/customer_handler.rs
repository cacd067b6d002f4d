//! Customer Handler
//!
//! Customer registration and the customer portal reads.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Reward, StampCard};
use crate::domain::{Customer, CustomerIdentifier, DomainError, OperationContext, Role};
use crate::error::AppError;
use crate::repository::LedgerStore;

use super::credentials::IssuedApiKey;
use super::store_handler::normalize_contacts;
use super::{RegisterCustomerCommand, RegisterCustomerResult};

/// Handler for customer operations
pub struct CustomerHandler {
    store: Arc<dyn LedgerStore>,
}

impl CustomerHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Register a customer and issue their API key
    pub async fn register(
        &self,
        command: RegisterCustomerCommand,
        context: &OperationContext,
    ) -> Result<RegisterCustomerResult, AppError> {
        let (email, phone) = normalize_contacts(command.email.as_deref(), command.phone.as_deref())?;

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4(),
            email,
            phone,
            created_at: now,
        };
        let key = IssuedApiKey::generate(
            customer.display_name(),
            Role::Customer,
            None,
            Some(customer.id),
            now,
        );

        self.store.insert_customer(&customer, &key.record).await?;

        tracing::info!(
            customer_id = %customer.id,
            correlation_id = ?context.correlation_id,
            "Customer registered"
        );

        Ok(RegisterCustomerResult {
            customer,
            api_key: key.secret,
        })
    }

    /// The customer's cards, newest first
    pub async fn list_cards(&self, customer_id: Uuid) -> Result<Vec<StampCard>, AppError> {
        self.ensure_exists(customer_id).await?;
        Ok(self.store.list_cards(customer_id).await?)
    }

    /// The customer's rewards, newest first
    pub async fn list_rewards(&self, customer_id: Uuid) -> Result<Vec<Reward>, AppError> {
        self.ensure_exists(customer_id).await?;
        Ok(self.store.list_rewards(customer_id).await?)
    }

    async fn ensure_exists(&self, customer_id: Uuid) -> Result<(), AppError> {
        self.store
            .find_customer(&CustomerIdentifier::Id(customer_id))
            .await?
            .map(|_| ())
            .ok_or_else(|| DomainError::CustomerNotFound(customer_id.to_string()).into())
    }
}
