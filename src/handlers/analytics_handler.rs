//! Analytics Handler

use std::sync::Arc;

use crate::analytics::{Analytics, AnalyticsScope};
use crate::error::AppError;
use crate::repository::LedgerStore;

/// Handler for dashboard reads
pub struct AnalyticsHandler {
    store: Arc<dyn LedgerStore>,
    recent_limit: usize,
}

impl AnalyticsHandler {
    pub fn new(store: Arc<dyn LedgerStore>, recent_limit: usize) -> Self {
        Self {
            store,
            recent_limit,
        }
    }

    pub async fn execute(&self, scope: AnalyticsScope) -> Result<Analytics, AppError> {
        Ok(self.store.analytics(scope, self.recent_limit).await?)
    }
}
