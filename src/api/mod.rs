//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::repository::LedgerStore;

pub use middleware::Principal;
pub use routes::create_router;

/// Header carrying the request correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Shared router state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    /// Number of recent transactions on the dashboard
    pub recent_transactions_limit: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, recent_transactions_limit: usize) -> Self {
        Self {
            store,
            recent_transactions_limit,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let correlation_header = HeaderName::from_static(CORRELATION_ID_HEADER);

    // Note: Axum layers are applied in reverse order (last added = first executed)
    // Order: logging -> auth -> handler
    let protected_routes = create_router()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::logging_middleware));

    Router::new()
        // Health check (no auth)
        .route("/health", get(routes::health_check))
        // Customer self-registration (no auth)
        .route("/customers", post(routes::register_customer))
        // Protected API routes
        .nest("/api/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        // Portals are served from their own origin
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // Every request carries a correlation id; echoed on the response
        .layer(PropagateRequestIdLayer::new(correlation_header.clone()))
        .layer(SetRequestIdLayer::new(correlation_header, MakeRequestUuid))
        .with_state(state)
}
