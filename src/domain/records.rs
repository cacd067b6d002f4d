//! Ledger records
//!
//! Plain records for the long-lived entities (stores, templates, customers),
//! the append-only transaction log, and the access-control rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{DomainError, IssuanceRule};

/// A merchant taking part in the programme
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreAccount {
    pub id: Uuid,
    pub name: String,
    pub owner_email: Option<String>,
    pub owner_phone: Option<String>,
    #[serde(skip_serializing)]
    pub owner_password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl StoreAccount {
    /// Email if present, otherwise phone
    pub fn owner_contact(&self) -> Option<&str> {
        self.owner_email.as_deref().or(self.owner_phone.as_deref())
    }
}

/// The stamp card a store offers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardTemplate {
    pub id: Uuid,
    pub store_id: Uuid,
    pub name: String,
    pub stamps_required: i32,
    pub reward_description: String,
    pub rule: IssuanceRule,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A registered customer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Name shown in staff activity feeds
    pub fn display_name(&self) -> String {
        self.email
            .clone()
            .or_else(|| self.phone.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Kind of audited ledger event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Stamp,
    Redemption,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Stamp => "stamp",
            TransactionType::Redemption => "redemption",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stamp" => Ok(TransactionType::Stamp),
            "redemption" => Ok(TransactionType::Redemption),
            other => Err(DomainError::InvalidState(format!(
                "unknown transaction type '{}'",
                other
            ))),
        }
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub card_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub purchase_amount: Option<Decimal>,
    pub stamps_added: i32,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn stamp(
        store_id: Uuid,
        customer_id: Uuid,
        card_id: Uuid,
        purchase_amount: Option<Decimal>,
        stamps_added: i32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id,
            customer_id,
            card_id,
            reward_id: None,
            transaction_type: TransactionType::Stamp,
            purchase_amount,
            stamps_added,
            created_at: at,
        }
    }

    pub fn redemption(
        store_id: Uuid,
        customer_id: Uuid,
        card_id: Uuid,
        reward_id: Uuid,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id,
            customer_id,
            card_id,
            reward_id: Some(reward_id),
            transaction_type: TransactionType::Redemption,
            purchase_amount: None,
            stamps_added: 0,
            created_at: at,
        }
    }
}

/// Portal role an API key acts as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Staff,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Customer => "customer",
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "customer" => Ok(Role::Customer),
            other => Err(DomainError::InvalidState(format!("unknown role '{}'", other))),
        }
    }
}

/// Stored API key (the secret itself is never stored)
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub role: Role,
    pub store_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of a completed, idempotency-keyed redemption
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub key: Uuid,
    pub request_hash: String,
    pub reward_id: Uuid,
    pub created_at: DateTime<Utc>,
}
