//! Domain Error Types
//!
//! Pure ledger errors that don't depend on infrastructure.

use thiserror::Error;

/// Coarse error taxonomy exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    State,
}

/// Ledger errors
///
/// Business rule violations and domain invariant failures. Every variant maps
/// to a stable machine-readable code through [`DomainError::code`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Store is inactive: {0}")]
    StoreInactive(String),

    #[error("Store has no active card template: {0}")]
    CardTemplateMissing(String),

    #[error("Reward not found")]
    RewardNotFound,

    #[error("Reward has already been redeemed")]
    RewardAlreadyRedeemed,

    #[error("Could not allocate a unique reward code")]
    DuplicateRewardCode,

    #[error("Contact already registered: {0}")]
    DuplicateContact(String),

    #[error("Idempotency conflict: same key with different request")]
    IdempotencyConflict,

    #[error("Invalid rule configuration: {0}")]
    InvalidRuleConfiguration(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DomainError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CustomerNotFound(_)
            | Self::StoreNotFound(_)
            | Self::CardTemplateMissing(_)
            | Self::RewardNotFound => ErrorKind::NotFound,
            Self::RewardAlreadyRedeemed
            | Self::DuplicateRewardCode
            | Self::DuplicateContact(_)
            | Self::IdempotencyConflict => ErrorKind::Conflict,
            Self::InvalidRuleConfiguration(_) | Self::InvalidAmount(_) | Self::Validation(_) => {
                ErrorKind::Validation
            }
            Self::StoreInactive(_) | Self::InvalidState(_) => ErrorKind::State,
        }
    }

    /// Stable reason string returned to clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::CustomerNotFound(_) => "customer_not_found",
            Self::StoreNotFound(_) => "store_not_found",
            Self::StoreInactive(_) => "store_inactive",
            Self::CardTemplateMissing(_) => "card_template_missing",
            Self::RewardNotFound => "reward_not_found",
            Self::RewardAlreadyRedeemed => "reward_already_redeemed",
            Self::DuplicateRewardCode => "duplicate_reward_code",
            Self::DuplicateContact(_) => "duplicate_contact",
            Self::IdempotencyConflict => "idempotency_conflict",
            Self::InvalidRuleConfiguration(_) => "invalid_rule_configuration",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::Validation(_) => "validation_error",
            Self::InvalidState(_) => "invalid_state",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<super::AmountError> for DomainError {
    fn from(err: super::AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}
