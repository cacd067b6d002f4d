//! Analytics
//!
//! Read-side aggregation over cards, rewards and the transaction log.
//! Results are eventually consistent with in-flight writes.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{CardStatus, RewardStatus};
use crate::domain::{Transaction, TransactionType};

/// Which slice of the ledger to aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsScope {
    Store(Uuid),
    Global,
}

/// Share of issued rewards that have been redeemed, as an integer percent.
///
/// Rounds half away from zero; no rewards at all is 0%.
pub fn redemption_rate(redeemed: i64, available: i64) -> u32 {
    let total = redeemed + available;
    if total <= 0 {
        return 0;
    }

    (Decimal::from(redeemed) * Decimal::ONE_HUNDRED / Decimal::from(total))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(0)
}

/// Cards per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCounts {
    pub active_cards: i64,
    pub completed_cards: i64,
    pub redeemed_cards: i64,
}

impl CardCounts {
    pub fn tally(statuses: impl IntoIterator<Item = CardStatus>) -> Self {
        statuses.into_iter().fold(Self::default(), |mut counts, status| {
            match status {
                CardStatus::Active => counts.active_cards += 1,
                CardStatus::Completed => counts.completed_cards += 1,
                CardStatus::Redeemed => counts.redeemed_cards += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> i64 {
        self.active_cards + self.completed_cards + self.redeemed_cards
    }
}

/// Rewards per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardCounts {
    pub available_rewards: i64,
    pub redeemed_rewards: i64,
}

impl RewardCounts {
    pub fn tally(statuses: impl IntoIterator<Item = RewardStatus>) -> Self {
        statuses.into_iter().fold(Self::default(), |mut counts, status| {
            match status {
                RewardStatus::Available => counts.available_rewards += 1,
                RewardStatus::Redeemed => counts.redeemed_rewards += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> i64 {
        self.available_rewards + self.redeemed_rewards
    }

    pub fn redemption_rate(&self) -> u32 {
        redemption_rate(self.redeemed_rewards, self.available_rewards)
    }
}

/// Sums over the transaction log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTotals {
    pub total_stamps_issued: i64,
    pub total_redemptions: i64,
    pub total_revenue: Decimal,
}

impl ActivityTotals {
    pub fn tally<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        transactions.into_iter().fold(Self::default(), |mut totals, tx| {
            match tx.transaction_type {
                TransactionType::Stamp => {
                    totals.total_stamps_issued += i64::from(tx.stamps_added);
                    totals.total_revenue += tx.purchase_amount.unwrap_or(Decimal::ZERO);
                }
                TransactionType::Redemption => totals.total_redemptions += 1,
            }
            totals
        })
    }
}

/// Activity feed entry for the staff portal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentTransaction {
    pub transaction_id: Uuid,
    pub customer_name: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub purchase_amount: Option<Decimal>,
    pub stamps_added: i32,
    pub timestamp: DateTime<Utc>,
}

/// Per-store dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreAnalytics {
    pub store_id: Uuid,
    pub total_customers: i64,
    #[serde(flatten)]
    pub cards: CardCounts,
    #[serde(flatten)]
    pub rewards: RewardCounts,
    pub redemption_rate: u32,
    #[serde(flatten)]
    pub activity: ActivityTotals,
    pub recent_transactions: Vec<RecentTransaction>,
}

/// System-wide dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAnalytics {
    pub total_stores: i64,
    pub active_stores: i64,
    pub total_customers: i64,
    pub total_cards: i64,
    #[serde(flatten)]
    pub cards: CardCounts,
    pub total_rewards: i64,
    #[serde(flatten)]
    pub rewards: RewardCounts,
    pub redemption_rate: u32,
    #[serde(flatten)]
    pub activity: ActivityTotals,
}

/// Analytics for either scope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Analytics {
    Store(StoreAnalytics),
    Global(GlobalAnalytics),
}
