//! Aggregate module
//!
//! The two stateful ledger entities and their allowed transitions.
//! Storage backends load them, call a command, and persist the result
//! inside one atomic step.

pub mod reward;
pub mod stamp_card;

pub use reward::{Reward, RewardSnapshot, RewardStatus};
pub use stamp_card::{CardSnapshot, CardStatus, StampCard, StampIssue};
