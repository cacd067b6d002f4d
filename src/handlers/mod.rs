//! Command Handlers module
//!
//! Handlers that validate commands, resolve the records they refer to, and
//! hand the atomic part of each operation to the ledger store.

mod analytics_handler;
mod commands;
pub mod credentials;
mod customer_handler;
mod redemption_handler;
mod stamp_handler;
mod store_handler;
mod template_handler;

#[cfg(test)]
mod tests;

pub use analytics_handler::AnalyticsHandler;
pub use commands::*;
pub use credentials::{hash_api_key, IssuedApiKey};
pub use customer_handler::CustomerHandler;
pub use redemption_handler::RedemptionHandler;
pub use stamp_handler::StampHandler;
pub use store_handler::StoreHandler;
pub use template_handler::TemplateHandler;
