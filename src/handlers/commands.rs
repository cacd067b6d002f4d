//! Command definitions
//!
//! Commands represent intentions to change the ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::aggregate::{Reward, StampCard};
use crate::domain::{CardTemplate, Customer, IssuanceRule, StoreAccount};

// =========================================================================
// IssueStampCommand
// =========================================================================

/// Command to record a visit or purchase for a customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueStampCommand {
    /// Customer id (scanned QR), email or phone
    pub customer_identifier: String,
    pub store_id: Uuid,
    /// Purchase total; required for amount rules to earn anything
    pub purchase_amount: Option<Decimal>,
}

impl IssueStampCommand {
    pub fn new(customer_identifier: String, store_id: Uuid) -> Self {
        Self {
            customer_identifier,
            store_id,
            purchase_amount: None,
        }
    }

    pub fn with_purchase_amount(mut self, amount: Decimal) -> Self {
        self.purchase_amount = Some(amount);
        self
    }
}

// =========================================================================
// ConfirmRedemptionCommand
// =========================================================================

/// Command to redeem a reward at a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRedemptionCommand {
    /// Reward code as scanned or typed by staff
    pub reward_code: String,
    pub store_id: Uuid,
}

impl ConfirmRedemptionCommand {
    pub fn new(reward_code: String, store_id: Uuid) -> Self {
        Self {
            reward_code,
            store_id,
        }
    }
}

// =========================================================================
// CreateStoreCommand
// =========================================================================

/// Command to onboard a store
#[derive(Clone, Deserialize)]
pub struct CreateStoreCommand {
    pub name: String,
    pub owner_email: Option<String>,
    pub owner_phone: Option<String>,
    pub owner_password: String,
}

impl CreateStoreCommand {
    pub fn new(name: String, owner_password: String) -> Self {
        Self {
            name,
            owner_email: None,
            owner_phone: None,
            owner_password,
        }
    }

    pub fn with_owner_email(mut self, email: String) -> Self {
        self.owner_email = Some(email);
        self
    }

    pub fn with_owner_phone(mut self, phone: String) -> Self {
        self.owner_phone = Some(phone);
        self
    }
}

impl fmt::Debug for CreateStoreCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateStoreCommand")
            .field("name", &self.name)
            .field("owner_email", &self.owner_email)
            .field("owner_phone", &self.owner_phone)
            .field("owner_password", &"[REDACTED]")
            .finish()
    }
}

// =========================================================================
// CreateCardTemplateCommand
// =========================================================================

/// Command to publish a store's card template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCardTemplateCommand {
    pub store_id: Uuid,
    pub name: String,
    pub stamps_required: i32,
    pub reward_description: String,
    pub rule: IssuanceRule,
}

impl CreateCardTemplateCommand {
    pub fn new(
        store_id: Uuid,
        name: String,
        stamps_required: i32,
        reward_description: String,
    ) -> Self {
        Self {
            store_id,
            name,
            stamps_required,
            reward_description,
            rule: IssuanceRule::Visit,
        }
    }

    pub fn with_rule(mut self, rule: IssuanceRule) -> Self {
        self.rule = rule;
        self
    }
}

// =========================================================================
// RegisterCustomerCommand
// =========================================================================

/// Command to register a customer by email and/or phone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterCustomerCommand {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl RegisterCustomerCommand {
    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_phone(mut self, phone: String) -> Self {
        self.phone = Some(phone);
        self
    }
}

// =========================================================================
// Results
// =========================================================================

/// Result of a stamp issuance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueStampResult {
    pub card: StampCard,
    pub stamps_added: i32,
    pub reward: Option<Reward>,
    pub message: String,
}

/// Result of a redemption
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionResult {
    pub reward: Reward,
    pub card: StampCard,
    /// The request was answered from its idempotency record
    pub replayed: bool,
    pub message: String,
}

/// Result of a store creation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoreResult {
    pub store: StoreAccount,
    /// Staff API key secret; shown only once
    pub api_key: String,
}

/// Result of a customer registration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCustomerResult {
    pub customer: Customer,
    /// Customer API key secret; shown only once
    pub api_key: String,
}

/// Result of a template creation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardTemplateResult {
    pub template: CardTemplate,
}
