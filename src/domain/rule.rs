//! Issuance rules
//!
//! Policy converting a store visit or a purchase amount into a stamp count.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::{MAX_AMOUNT, MAX_SCALE};
use super::{DomainError, PurchaseAmount};

/// How a card template awards stamps.
///
/// Serialized the way the portals send it:
/// `{"kind": "visit"}` or `{"kind": "amount", "threshold": "10"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssuanceRule {
    /// One stamp per visit regardless of the purchase
    Visit,
    /// One stamp per full `threshold` of purchase amount
    Amount { threshold: Decimal },
}

impl IssuanceRule {
    /// Rule kind as stored in the database
    pub fn kind(&self) -> &'static str {
        match self {
            IssuanceRule::Visit => "visit",
            IssuanceRule::Amount { .. } => "amount",
        }
    }

    /// Threshold for amount rules
    pub fn threshold(&self) -> Option<Decimal> {
        match self {
            IssuanceRule::Visit => None,
            IssuanceRule::Amount { threshold } => Some(*threshold),
        }
    }

    /// Rebuild a rule from its stored columns
    pub fn from_parts(kind: &str, threshold: Option<Decimal>) -> Result<Self, DomainError> {
        match (kind, threshold) {
            ("visit", _) => Ok(IssuanceRule::Visit),
            ("amount", Some(threshold)) => Ok(IssuanceRule::Amount { threshold }),
            ("amount", None) => Err(DomainError::InvalidRuleConfiguration(
                "amount rule without threshold".to_string(),
            )),
            (other, _) => Err(DomainError::InvalidRuleConfiguration(format!(
                "unknown rule kind '{}'",
                other
            ))),
        }
    }

    /// Reject rules that can never be applied
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            IssuanceRule::Visit => Ok(()),
            IssuanceRule::Amount { threshold } if *threshold <= Decimal::ZERO => {
                Err(DomainError::InvalidRuleConfiguration(format!(
                    "amount threshold must be positive (got {})",
                    threshold
                )))
            }
            // stored as NUMERIC(14, 2); finer thresholds would be rounded
            IssuanceRule::Amount { threshold } if threshold.normalize().scale() > MAX_SCALE => {
                Err(DomainError::InvalidRuleConfiguration(format!(
                    "amount threshold allows at most {} decimal places (got {})",
                    MAX_SCALE, threshold
                )))
            }
            IssuanceRule::Amount { threshold } if *threshold > Decimal::from(MAX_AMOUNT) => {
                Err(DomainError::InvalidRuleConfiguration(format!(
                    "amount threshold exceeds {} (got {})",
                    MAX_AMOUNT, threshold
                )))
            }
            IssuanceRule::Amount { .. } => Ok(()),
        }
    }

    /// Stamps earned by a single visit/purchase, before clamping to the card.
    ///
    /// Amount rules award `floor(amount / threshold)`; an absent amount earns nothing.
    pub fn stamps_for(&self, purchase: Option<PurchaseAmount>) -> Result<i32, DomainError> {
        match self {
            IssuanceRule::Visit => Ok(1),
            IssuanceRule::Amount { threshold } => {
                self.validate()?;
                let amount = purchase.map(|p| p.value()).unwrap_or(Decimal::ZERO);
                // saturate: the card clamps to stamps_required anyway
                let stamps = amount
                    .checked_div(*threshold)
                    .and_then(|quotient| quotient.floor().to_i32())
                    .unwrap_or(i32::MAX);
                Ok(stamps.max(0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(value: i64) -> Option<PurchaseAmount> {
        Some(PurchaseAmount::new(Decimal::from(value)).unwrap())
    }

    #[test]
    fn test_visit_rule_always_one() {
        let rule = IssuanceRule::Visit;
        assert_eq!(rule.stamps_for(None).unwrap(), 1);
        assert_eq!(rule.stamps_for(amount(0)).unwrap(), 1);
        assert_eq!(rule.stamps_for(amount(500)).unwrap(), 1);
    }

    #[test]
    fn test_amount_rule_floors() {
        let rule = IssuanceRule::Amount { threshold: Decimal::from(10) };
        assert_eq!(rule.stamps_for(amount(25)).unwrap(), 2);
        assert_eq!(rule.stamps_for(amount(9)).unwrap(), 0);
        assert_eq!(rule.stamps_for(amount(10)).unwrap(), 1);
        assert_eq!(rule.stamps_for(None).unwrap(), 0);
    }

    #[test]
    fn test_amount_rule_fractional_threshold() {
        let rule = IssuanceRule::Amount { threshold: Decimal::new(25, 1) };
        let purchase = Some(PurchaseAmount::new(Decimal::new(999, 2)).unwrap());
        assert_eq!(rule.stamps_for(purchase).unwrap(), 3);
    }

    #[test]
    fn test_non_positive_threshold_rejected() {
        for threshold in [Decimal::ZERO, Decimal::from(-5)] {
            let rule = IssuanceRule::Amount { threshold };
            assert!(matches!(
                rule.stamps_for(amount(100)),
                Err(DomainError::InvalidRuleConfiguration(_))
            ));
            assert!(rule.validate().is_err());
        }
    }

    #[test]
    fn test_threshold_precision_and_bounds() {
        for threshold in [Decimal::new(2555, 3), Decimal::new(1, 3)] {
            let rule = IssuanceRule::Amount { threshold };
            assert!(matches!(
                rule.validate(),
                Err(DomainError::InvalidRuleConfiguration(_))
            ));
        }

        let too_large = IssuanceRule::Amount { threshold: Decimal::from(MAX_AMOUNT + 1) };
        assert!(too_large.validate().is_err());

        // trailing zeros are not extra precision
        let cents = IssuanceRule::Amount { threshold: Decimal::new(25500, 4) };
        assert!(cents.validate().is_ok());
    }

    #[test]
    fn test_rule_json_shape() {
        let rule: IssuanceRule = serde_json::from_str(r#"{"kind":"visit"}"#).unwrap();
        assert_eq!(rule, IssuanceRule::Visit);

        let rule: IssuanceRule =
            serde_json::from_str(r#"{"kind":"amount","threshold":"10"}"#).unwrap();
        assert_eq!(rule.threshold(), Some(Decimal::from(10)));
        assert_eq!(rule.kind(), "amount");
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(IssuanceRule::from_parts("visit", None).unwrap(), IssuanceRule::Visit);
        assert!(IssuanceRule::from_parts("amount", None).is_err());
        assert!(IssuanceRule::from_parts("spend", Some(Decimal::ONE)).is_err());
    }
}
