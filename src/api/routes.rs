//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Reward, StampCard};
use crate::analytics::Analytics;
use crate::domain::{IssuanceRule, OperationContext, StoreAccount};
use crate::error::AppError;
use crate::handlers::{
    AnalyticsHandler, ConfirmRedemptionCommand, CreateCardTemplateCommand,
    CreateCardTemplateResult, CreateStoreCommand, CreateStoreResult, CustomerHandler,
    IssueStampCommand, IssueStampResult, RedemptionHandler, RedemptionResult,
    RegisterCustomerCommand, RegisterCustomerResult, StampHandler, StoreHandler,
    TemplateHandler,
};
use crate::repository::StoreSummary;

use super::middleware::{correlation_id, Principal};
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueStampRequest {
    /// Customer id, email or phone
    pub customer_identifier: String,
    #[serde(default)]
    pub store_id: Option<Uuid>,
    #[serde(default)]
    pub purchase_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub reward_code: String,
    #[serde(default)]
    pub store_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub store_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoreRequest {
    pub name: String,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub owner_phone: Option<String>,
    pub owner_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
    pub stamps_required: i32,
    pub reward_description: String,
    /// Defaults to one stamp per visit
    #[serde(default)]
    pub rule: Option<IssuanceRule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCustomerRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Success envelope: `{ "success": true, ...payload }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsResponse {
    pub customer_id: Uuid,
    pub cards: Vec<StampCard>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsResponse {
    pub customer_id: Uuid,
    pub rewards: Vec<Reward>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub analytics: Analytics,
}

#[derive(Debug, Serialize)]
pub struct StoresResponse {
    pub stores: Vec<StoreSummary>,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub store: StoreAccount,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

fn path_param<T>(path: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    path
        .map(|Path(value)| value)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

/// Optional `Idempotency-Key` header; must be a UUID when present
fn idempotency_key(headers: &HeaderMap) -> Result<Option<Uuid>, AppError> {
    headers
        .get("Idempotency-Key")
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .ok_or_else(|| {
                    AppError::InvalidHeader("Idempotency-Key must be a UUID".to_string())
                })
        })
        .transpose()
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Counter operations
        .route("/stamps", post(issue_stamp))
        .route("/redemptions", post(confirm_redemption))
        // Dashboard
        .route("/analytics", get(get_analytics))
        // Customer portal
        .route("/customers/:customer_id/cards", get(list_cards))
        .route("/customers/:customer_id/rewards", get(list_rewards))
        // Store management
        .route("/stores", post(create_store).get(list_stores))
        .route("/stores/:store_id/deactivate", post(deactivate_store))
        .route("/stores/:store_id/activate", post(activate_store))
        .route("/stores/:store_id/templates", post(create_card_template))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

// =========================================================================
// POST /stamps
// =========================================================================

/// Record a visit or purchase for a customer
async fn issue_stamp(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<IssueStampRequest>, JsonRejection>,
) -> ApiResult<IssueStampResult> {
    let request = json_body(payload)?;
    let store_id = principal.acting_store(request.store_id)?;

    let command = IssueStampCommand::new(request.customer_identifier, store_id);
    let command = match request.purchase_amount {
        Some(amount) => command.with_purchase_amount(amount),
        None => command,
    };

    let result = StampHandler::new(state.store)
        .execute(command, &context)
        .await?;

    Ok(ApiResponse::ok(result))
}

// =========================================================================
// POST /redemptions
// =========================================================================

/// Redeem a reward code at the counter
async fn confirm_redemption(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    payload: Result<Json<RedeemRequest>, JsonRejection>,
) -> ApiResult<RedemptionResult> {
    let request = json_body(payload)?;
    let store_id = principal.acting_store(request.store_id)?;
    let idempotency_key = idempotency_key(&headers)?;

    let command = ConfirmRedemptionCommand::new(request.reward_code, store_id);
    let result = RedemptionHandler::new(state.store)
        .execute(command, idempotency_key, &context)
        .await?;

    Ok(ApiResponse::ok(result))
}

// =========================================================================
// GET /analytics
// =========================================================================

/// Dashboard numbers for one store or, for admins, all stores
async fn get_analytics(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> ApiResult<AnalyticsResponse> {
    let Query(query) = query.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
    let scope = principal.analytics_scope(query.store_id)?;

    let analytics = AnalyticsHandler::new(state.store, state.recent_transactions_limit)
        .execute(scope)
        .await?;

    Ok(ApiResponse::ok(AnalyticsResponse { analytics }))
}

// =========================================================================
// GET /customers/:customer_id/cards, /rewards
// =========================================================================

async fn list_cards(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    customer_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<CardsResponse> {
    let customer_id = path_param(customer_id)?;
    principal.require_customer_access(customer_id)?;

    let cards = CustomerHandler::new(state.store)
        .list_cards(customer_id)
        .await?;

    Ok(ApiResponse::ok(CardsResponse { customer_id, cards }))
}

async fn list_rewards(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    customer_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<RewardsResponse> {
    let customer_id = path_param(customer_id)?;
    principal.require_customer_access(customer_id)?;

    let rewards = CustomerHandler::new(state.store)
        .list_rewards(customer_id)
        .await?;

    Ok(ApiResponse::ok(RewardsResponse {
        customer_id,
        rewards,
    }))
}

// =========================================================================
// POST /customers (public)
// =========================================================================

/// Register a customer; the response carries their API key
pub async fn register_customer(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RegisterCustomerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<RegisterCustomerResult>>), AppError> {
    let request = json_body(payload)?;
    let mut context = OperationContext::new();
    if let Some(id) = correlation_id(&headers) {
        context = context.with_correlation_id(id);
    }
    context.ensure_correlation_id();

    let command = RegisterCustomerCommand {
        email: request.email,
        phone: request.phone,
    };
    let result = CustomerHandler::new(state.store)
        .register(command, &context)
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(result)))
}

// =========================================================================
// /stores
// =========================================================================

/// Onboard a store; the response carries its staff API key
async fn create_store(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<CreateStoreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreateStoreResult>>), AppError> {
    principal.require_admin()?;
    let request = json_body(payload)?;

    let command = CreateStoreCommand {
        name: request.name,
        owner_email: request.owner_email,
        owner_phone: request.owner_phone,
        owner_password: request.owner_password,
    };
    let result = StoreHandler::new(state.store)
        .create(command, &context)
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(result)))
}

async fn list_stores(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<StoresResponse> {
    principal.require_admin()?;

    let stores = StoreHandler::new(state.store).list().await?;

    Ok(ApiResponse::ok(StoresResponse { stores }))
}

async fn deactivate_store(
    state: State<AppState>,
    principal: Extension<Principal>,
    context: Extension<OperationContext>,
    store_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StoreResponse> {
    set_store_active(state, principal, context, store_id, false).await
}

async fn activate_store(
    state: State<AppState>,
    principal: Extension<Principal>,
    context: Extension<OperationContext>,
    store_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StoreResponse> {
    set_store_active(state, principal, context, store_id, true).await
}

async fn set_store_active(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(context): Extension<OperationContext>,
    store_id: Result<Path<Uuid>, PathRejection>,
    active: bool,
) -> ApiResult<StoreResponse> {
    principal.require_admin()?;
    let store_id = path_param(store_id)?;

    let store = StoreHandler::new(state.store)
        .set_active(store_id, active, &context)
        .await?;

    Ok(ApiResponse::ok(StoreResponse { store }))
}

// =========================================================================
// POST /stores/:store_id/templates
// =========================================================================

/// Publish a new card template for a store
async fn create_card_template(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(context): Extension<OperationContext>,
    store_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CreateTemplateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreateCardTemplateResult>>), AppError> {
    let store_id = path_param(store_id)?;
    principal.require_store_manager(store_id)?;
    let request = json_body(payload)?;

    let command = CreateCardTemplateCommand::new(
        store_id,
        request.name,
        request.stamps_required,
        request.reward_description,
    );
    let command = match request.rule {
        Some(rule) => command.with_rule(rule),
        None => command,
    };

    let result = TemplateHandler::new(state.store)
        .execute(command, &context)
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(result)))
}
