//! Purchase amount type
//!
//! Domain primitive for the purchase total a stamp is issued against.
//! Amounts are validated at construction time, so a negative or
//! over-precise amount cannot reach the issuance rules.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted purchase (one billion)
pub(crate) const MAX_AMOUNT: i64 = 1_000_000_000;

/// Maximum decimal places (cents)
pub(crate) const MAX_SCALE: u32 = 2;

/// PurchaseAmount represents a validated purchase total.
///
/// # Invariants
/// - Value is zero or positive
/// - Maximum 2 decimal places
/// - Maximum value is one billion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use stamp_ledger::domain::PurchaseAmount;
///
/// let amount = PurchaseAmount::new(Decimal::new(2550, 2)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(2550, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct PurchaseAmount(Decimal);

/// Errors that can occur when creating a PurchaseAmount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must not be negative (got {0})")]
    Negative(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl PurchaseAmount {
    /// Create a new PurchaseAmount with validation.
    ///
    /// # Errors
    /// - `AmountError::Negative` if value < 0
    /// - `AmountError::TooManyDecimals` if more than 2 significant decimal places
    /// - `AmountError::Overflow` if value > one billion
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value));
        }

        // "25.50" and "25.5" are the same purchase
        let value = value.normalize();
        if value.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        if value > Decimal::from(MAX_AMOUNT) {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for PurchaseAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for PurchaseAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        PurchaseAmount::new(decimal)
    }
}

impl TryFrom<Decimal> for PurchaseAmount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        PurchaseAmount::new(value)
    }
}

impl From<PurchaseAmount> for Decimal {
    fn from(amount: PurchaseAmount) -> Self {
        amount.0
    }
}
