//! Domain module
//!
//! Core ledger types and business rules.

pub mod amount;
pub mod context;
pub mod error;
pub mod identifier;
pub mod records;
pub mod reward_code;
pub mod rule;

pub use amount::{AmountError, PurchaseAmount};
pub use context::OperationContext;
pub use error::{DomainError, ErrorKind};
pub use identifier::CustomerIdentifier;
pub use records::{
    ApiKeyRecord, CardTemplate, Customer, IdempotencyRecord, Role, StoreAccount, Transaction,
    TransactionType,
};
pub use reward_code::RewardCodeGenerator;
pub use rule::IssuanceRule;
