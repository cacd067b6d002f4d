//! Reward Aggregate
//!
//! One reward per completed card, redeemable once at the issuing store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::DomainError;

use super::{CardStatus, StampCard};

/// Reward status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStatus {
    Available,
    Redeemed,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardStatus::Available => "available",
            RewardStatus::Redeemed => "redeemed",
        }
    }
}

impl fmt::Display for RewardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(RewardStatus::Available),
            "redeemed" => Ok(RewardStatus::Redeemed),
            other => Err(DomainError::InvalidState(format!(
                "unknown reward status '{}'",
                other
            ))),
        }
    }
}

/// Full persisted state of a reward
#[derive(Debug, Clone)]
pub struct RewardSnapshot {
    pub id: Uuid,
    pub card_id: Uuid,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub code: String,
    pub description: String,
    pub store_name: String,
    pub status: RewardStatus,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

/// Reward Aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    #[serde(rename = "rewardId")]
    id: Uuid,
    card_id: Uuid,
    store_id: Uuid,
    customer_id: Uuid,
    #[serde(rename = "rewardCode")]
    code: String,
    #[serde(rename = "rewardDescription")]
    description: String,
    store_name: String,
    status: RewardStatus,
    created_at: DateTime<Utc>,
    redeemed_at: Option<DateTime<Utc>>,
}

impl Reward {
    /// Create the reward for a card that has just completed
    pub fn issue(card: &StampCard, code: String, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if card.status() != CardStatus::Completed {
            return Err(DomainError::InvalidState(format!(
                "card {} is {}, rewards are only issued for completed cards",
                card.id(),
                card.status()
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            card_id: card.id(),
            store_id: card.store_id(),
            customer_id: card.customer_id(),
            code,
            description: card.reward_description().to_string(),
            store_name: card.store_name().to_string(),
            status: RewardStatus::Available,
            created_at: now,
            redeemed_at: None,
        })
    }

    /// Rebuild a reward from storage
    pub fn from_db_state(snapshot: RewardSnapshot) -> Result<Self, DomainError> {
        if (snapshot.status == RewardStatus::Redeemed) != snapshot.redeemed_at.is_some() {
            return Err(DomainError::InvalidState(format!(
                "reward {} is {} but redeemed_at is {:?}",
                snapshot.id, snapshot.status, snapshot.redeemed_at
            )));
        }

        Ok(Self {
            id: snapshot.id,
            card_id: snapshot.card_id,
            store_id: snapshot.store_id,
            customer_id: snapshot.customer_id,
            code: snapshot.code,
            description: snapshot.description,
            store_name: snapshot.store_name,
            status: snapshot.status,
            created_at: snapshot.created_at,
            redeemed_at: snapshot.redeemed_at,
        })
    }

    /// Redeem the reward on behalf of `acting_store`.
    ///
    /// A reward of another store is reported as not found so that codes
    /// cannot be discovered from another store.
    pub fn redeem(&mut self, acting_store: Uuid, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.store_id != acting_store {
            return Err(DomainError::RewardNotFound);
        }
        if self.status == RewardStatus::Redeemed {
            return Err(DomainError::RewardAlreadyRedeemed);
        }

        self.status = RewardStatus::Redeemed;
        self.redeemed_at = Some(now);
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn card_id(&self) -> Uuid {
        self.card_id
    }

    pub fn store_id(&self) -> Uuid {
        self.store_id
    }

    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn status(&self) -> RewardStatus {
        self.status
    }

    pub fn is_available(&self) -> bool {
        self.status == RewardStatus::Available
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn redeemed_at(&self) -> Option<DateTime<Utc>> {
        self.redeemed_at
    }
}
