//! Stamp Ledger Library
//!
//! Re-exports modules for integration testing and external use.

pub mod aggregate;
pub mod analytics;
pub mod api;
pub mod domain;
pub mod handlers;
pub mod repository;

pub mod config;
pub mod db;
mod error;

pub use api::{build_router, AppState};
pub use config::{Config, StorageBackend};
pub use domain::{DomainError, OperationContext};
pub use error::{AppError, AppResult, ErrorResponse};
pub use repository::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
