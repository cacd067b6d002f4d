//! Stamp Card Aggregate
//!
//! A customer's progress towards a reward on one card template.
//! `current_stamps` only grows and never passes `stamps_required`; status
//! only moves forward: active -> completed -> redeemed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{CardTemplate, DomainError, PurchaseAmount};

use super::Reward;

/// Card status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Completed,
    Redeemed,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "active",
            CardStatus::Completed => "completed",
            CardStatus::Redeemed => "redeemed",
        }
    }
}

impl Default for CardStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CardStatus::Active),
            "completed" => Ok(CardStatus::Completed),
            "redeemed" => Ok(CardStatus::Redeemed),
            other => Err(DomainError::InvalidState(format!(
                "unknown card status '{}'",
                other
            ))),
        }
    }
}

/// Outcome of applying one visit/purchase to a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampIssue {
    /// Stamps actually added after clamping
    pub stamps_added: i32,
    /// The card reached its requirement with this issue
    pub completed: bool,
}

/// Full persisted state of a card, used to rebuild the aggregate from storage
#[derive(Debug, Clone)]
pub struct CardSnapshot {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub template_id: Uuid,
    pub store_id: Uuid,
    pub store_name: String,
    pub card_name: String,
    pub reward_description: String,
    pub stamps_required: i32,
    pub current_stamps: i32,
    pub status: CardStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

/// Stamp Card Aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StampCard {
    #[serde(rename = "cardId")]
    id: Uuid,
    customer_id: Uuid,
    template_id: Uuid,
    store_id: Uuid,
    store_name: String,
    card_name: String,
    reward_description: String,
    stamps_required: i32,
    current_stamps: i32,
    status: CardStatus,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    redeemed_at: Option<DateTime<Utc>>,
}

impl StampCard {
    /// Open a fresh card for a customer on the given template
    pub fn open(customer_id: Uuid, template: &CardTemplate, store_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            template_id: template.id,
            store_id: template.store_id,
            store_name: store_name.to_string(),
            card_name: template.name.clone(),
            reward_description: template.reward_description.clone(),
            stamps_required: template.stamps_required,
            current_stamps: 0,
            status: CardStatus::Active,
            created_at: now,
            completed_at: None,
            redeemed_at: None,
        }
    }

    /// Rebuild a card from storage, rejecting states that break the invariants
    pub fn from_db_state(snapshot: CardSnapshot) -> Result<Self, DomainError> {
        if snapshot.stamps_required < 1
            || snapshot.current_stamps < 0
            || snapshot.current_stamps > snapshot.stamps_required
        {
            return Err(DomainError::InvalidState(format!(
                "card {} has {}/{} stamps",
                snapshot.id, snapshot.current_stamps, snapshot.stamps_required
            )));
        }

        let full = snapshot.current_stamps == snapshot.stamps_required;
        if full != (snapshot.status != CardStatus::Active) {
            return Err(DomainError::InvalidState(format!(
                "card {} is {} with {}/{} stamps",
                snapshot.id, snapshot.status, snapshot.current_stamps, snapshot.stamps_required
            )));
        }

        Ok(Self {
            id: snapshot.id,
            customer_id: snapshot.customer_id,
            template_id: snapshot.template_id,
            store_id: snapshot.store_id,
            store_name: snapshot.store_name,
            card_name: snapshot.card_name,
            reward_description: snapshot.reward_description,
            stamps_required: snapshot.stamps_required,
            current_stamps: snapshot.current_stamps,
            status: snapshot.status,
            created_at: snapshot.created_at,
            completed_at: snapshot.completed_at,
            redeemed_at: snapshot.redeemed_at,
        })
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Apply one visit/purchase under the template's issuance rule.
    ///
    /// Stamps beyond the requirement are discarded, they do not roll over to
    /// a new card. A completed card accepts the visit but gains nothing.
    pub fn issue(
        &mut self,
        template: &CardTemplate,
        purchase: Option<PurchaseAmount>,
        now: DateTime<Utc>,
    ) -> Result<StampIssue, DomainError> {
        if template.id != self.template_id {
            return Err(DomainError::InvalidState(format!(
                "card {} does not belong to template {}",
                self.id, template.id
            )));
        }

        let earned = template.rule.stamps_for(purchase)?;

        match self.status {
            CardStatus::Redeemed => Err(DomainError::InvalidState(format!(
                "card {} is already redeemed",
                self.id
            ))),
            CardStatus::Completed => Ok(StampIssue {
                stamps_added: 0,
                completed: false,
            }),
            CardStatus::Active => {
                let room = self.stamps_required - self.current_stamps;
                let stamps_added = earned.clamp(0, room);
                self.current_stamps += stamps_added;

                let completed = self.current_stamps == self.stamps_required;
                if completed {
                    self.status = CardStatus::Completed;
                    self.completed_at = Some(now);
                }

                Ok(StampIssue {
                    stamps_added,
                    completed,
                })
            }
        }
    }

    /// Close the card once its reward has been redeemed
    pub fn mark_redeemed(&mut self, reward: &Reward, now: DateTime<Utc>) -> Result<(), DomainError> {
        if reward.card_id() != self.id {
            return Err(DomainError::InvalidState(format!(
                "reward {} was not issued for card {}",
                reward.id(),
                self.id
            )));
        }
        if self.status != CardStatus::Completed {
            return Err(DomainError::InvalidState(format!(
                "card {} is {}, only completed cards can be redeemed",
                self.id, self.status
            )));
        }

        self.status = CardStatus::Redeemed;
        self.redeemed_at = Some(now);
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    pub fn template_id(&self) -> Uuid {
        self.template_id
    }

    pub fn store_id(&self) -> Uuid {
        self.store_id
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn card_name(&self) -> &str {
        &self.card_name
    }

    pub fn reward_description(&self) -> &str {
        &self.reward_description
    }

    pub fn stamps_required(&self) -> i32 {
        self.stamps_required
    }

    pub fn current_stamps(&self) -> i32 {
        self.current_stamps
    }

    pub fn status(&self) -> CardStatus {
        self.status
    }

    pub fn is_redeemed(&self) -> bool {
        self.status == CardStatus::Redeemed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn redeemed_at(&self) -> Option<DateTime<Utc>> {
        self.redeemed_at
    }
}
