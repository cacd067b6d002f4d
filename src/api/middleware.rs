//! API Middleware
//!
//! Authentication, capability checks and request logging.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::analytics::AnalyticsScope;
use crate::domain::{OperationContext, Role};
use crate::error::AppError;
use crate::handlers::hash_api_key;

use super::AppState;

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct Principal {
    pub role: Role,
    /// Store a staff key is bound to
    pub store_id: Option<Uuid>,
    /// Customer a customer key is bound to
    pub customer_id: Option<Uuid>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn staff_store(&self) -> Option<Uuid> {
        match self.role {
            Role::Staff => self.store_id,
            _ => None,
        }
    }

    /// Admin-only operations
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin role required".to_string()))
        }
    }

    /// Store a staff/admin caller acts for at the counter.
    ///
    /// Staff act for their own store (a `storeId` in the request must match
    /// it); admins must name the store.
    pub fn acting_store(&self, requested: Option<Uuid>) -> Result<Uuid, AppError> {
        if let Some(own) = self.staff_store() {
            return match requested {
                Some(store_id) if store_id != own => {
                    Err(AppError::Forbidden("staff may only act for their own store".to_string()))
                }
                _ => Ok(own),
            };
        }

        if self.is_admin() {
            return requested
                .ok_or_else(|| AppError::InvalidRequest("storeId is required".to_string()));
        }

        Err(AppError::Forbidden("staff or admin role required".to_string()))
    }

    /// Store-scoped management (templates): staff of that store or admin
    pub fn require_store_manager(&self, store_id: Uuid) -> Result<(), AppError> {
        if self.is_admin() || self.staff_store() == Some(store_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden("not allowed to manage this store".to_string()))
        }
    }

    /// Dashboard scope: staff see their store, admins a store or everything
    pub fn analytics_scope(&self, requested: Option<Uuid>) -> Result<AnalyticsScope, AppError> {
        if self.is_admin() {
            return Ok(requested.map_or(AnalyticsScope::Global, AnalyticsScope::Store));
        }

        self.acting_store(requested).map(AnalyticsScope::Store)
    }

    /// Customer portal reads: the customer themself or admin
    pub fn require_customer_access(&self, customer_id: Uuid) -> Result<(), AppError> {
        let own = self.role == Role::Customer && self.customer_id == Some(customer_id);
        if own || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("not allowed to read this customer".to_string()))
        }
    }
}

// =========================================================================
// API Key Authentication Middleware
// =========================================================================

/// Extract and validate the API key from the X-API-Key header
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::MissingApiKey)?;

    let record = state
        .store
        .find_api_key(&hash_api_key(api_key))
        .await
        .map_err(|e| {
            tracing::error!("Storage error during API key validation: {}", e);
            AppError::from(e)
        })?
        .ok_or(AppError::InvalidApiKey)?;

    if !record.is_active {
        return Err(AppError::ApiKeyDisabled);
    }

    let correlation_id = correlation_id(&headers).unwrap_or_else(Uuid::new_v4);

    let context = OperationContext::new()
        .with_api_key(record.id, record.role)
        .with_correlation_id(correlation_id);

    tracing::debug!(api_key_id = %record.id, key_name = %record.name, "API key authenticated");

    request.extensions_mut().insert(Principal {
        role: record.role,
        store_id: record.store_id,
        customer_id: record.customer_id,
    });
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Correlation ID supplied by the caller, if it is a valid UUID
pub fn correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(super::CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked_value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = mask_headers_for_logging(request.headers());

    // auth runs inside this layer, so the header is the only source here
    let correlation_id = request
        .headers()
        .get(super::CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
