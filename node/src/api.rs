//! # REST API
//!
//! Builds the axum router that exposes the ledger engine over JSON. The
//! handlers only translate: request bodies into engine calls, engine results
//! into JSON, engine errors into status codes.
//!
//! ## Endpoints
//!
//! | Method | Path                            | Description                       |
//! |--------|---------------------------------|-----------------------------------|
//! | GET    | `/health`                       | Liveness probe                    |
//! | GET    | `/rates`                        | Exchange and fiat rate tables     |
//! | POST   | `/accounts`                     | Open an account                   |
//! | GET    | `/accounts/:id`                 | Account snapshot                  |
//! | GET    | `/accounts/:id/transactions`    | Transaction history, oldest first |
//! | POST   | `/accounts/:id/convert`         | Convert between currencies        |
//! | POST   | `/accounts/:id/wager`           | Coin-flip wager                   |
//! | POST   | `/accounts/:id/withdraw`        | Fiat withdrawal request           |
//! | POST   | `/accounts/:id/referral`        | Apply a referral code             |
//! | POST   | `/accounts/:id/referral/settle` | Finish a pending referral bonus   |
//! | POST   | `/accounts/:id/grant`           | Credit game or reward earnings    |
//!
//! Amounts travel as decimal strings (`"99.4"`), currencies as symbols
//! (`"NC"`). Errors come back as `{"error": "...", "code": "..."}`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use quintet_ledger::config::CONVERSION_FEE_RATIO;
use quintet_ledger::engine::ReferralReceipt;
use quintet_ledger::rates::RateEntry;
use quintet_ledger::storage::LedgerStore;
use quintet_ledger::vault::parse_amount;
use quintet_ledger::{Balances, Currency, Engine, EngineError, Profile, UserAccount, UserId};

use crate::metrics::SharedMetrics;

/// The engine as the node runs it: store chosen at startup.
pub type NodeEngine = Engine<Arc<dyn LedgerStore>>;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone, everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub engine: Arc<NodeEngine>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/rates", get(rates_handler))
        .route("/accounts", post(open_account_handler))
        .route("/accounts/:id", get(account_handler))
        .route("/accounts/:id/transactions", get(history_handler))
        .route("/accounts/:id/convert", post(convert_handler))
        .route("/accounts/:id/wager", post(wager_handler))
        .route("/accounts/:id/withdraw", post(withdraw_handler))
        .route("/accounts/:id/referral", post(referral_handler))
        .route("/accounts/:id/referral/settle", post(settle_referral_handler))
        .route("/accounts/:id/grant", post(grant_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error response: status plus `{error, code}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// HTTP status for each engine error.
pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::UnknownUser(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidAmount(_)
        | EngineError::UnknownCurrency(_)
        | EngineError::SameCurrency(_)
        | EngineError::InvalidReferralCode(_)
        | EngineError::SelfReferral(_) => StatusCode::BAD_REQUEST,
        EngineError::InsufficientBalance { .. }
        | EngineError::AlreadyReferred(_)
        | EngineError::AccountExists(_) => StatusCode::CONFLICT,
        EngineError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self {
            status: status_for(&err),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, error = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Malformed JSON, a missing field or the wrong content type.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            code: "invalid_request",
            message: rejection.body_text(),
        }
    }
}

/// A path segment that does not parse, e.g. a non-numeric account id.
impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self {
            status: rejection.status(),
            code: "invalid_path",
            message: rejection.body_text(),
        }
    }
}

/// Runs an engine call on the blocking pool and records its metrics.
///
/// Engine calls may wait on account locks and flush to disk, so they never
/// run on the async workers.
async fn run<T, F>(state: &AppState, op: &'static str, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&NodeEngine) -> Result<T, EngineError> + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    let started = Instant::now();

    let result = tokio::task::spawn_blocking(move || call(&engine))
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: format!("engine task failed: {e}"),
        })?;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.code(),
    };
    state.metrics.observe(op, outcome, started);
    result.map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /accounts`.
#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub user_id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Referral code the user arrived with.
    #[serde(default)]
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct WagerRequest {
    pub currency: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub currency: String,
    pub amount: String,
    pub method: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Deserialize)]
pub struct ReferralRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub currency: String,
    pub amount: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for account endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub user_id: UserId,
    pub profile: Profile,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub balances: Balances,
    pub referrals: u64,
    pub earned: Decimal,
    pub referral_bonus_pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserAccount> for AccountResponse {
    fn from(account: UserAccount) -> Self {
        Self {
            user_id: account.user_id,
            referral_code: account.referral_code().to_string(),
            referred_by: account.referred_by().map(str::to_string),
            balances: account.balances().clone(),
            referrals: account.referrals(),
            earned: account.earned(),
            referral_bonus_pending: account.is_referral_bonus_pending(),
            created_at: account.created_at(),
            updated_at: account.updated_at(),
            profile: account.profile,
        }
    }
}

/// Response payload for `GET /rates`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RatesResponse {
    /// Every off-diagonal cell of the conversion matrix.
    pub rates: Vec<RateEntry>,
    /// Fiat value of one unit of each currency.
    pub fiat: BTreeMap<Currency, Decimal>,
    pub conversion_fee_ratio: Decimal,
}

/// Response payload for `POST /accounts/:id/referral/settle`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettleResponse {
    /// `false` if nothing was pending.
    pub settled: bool,
    pub receipt: Option<ReferralReceipt>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 while the node is alive.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /rates`
async fn rates_handler(State(state): State<AppState>) -> impl IntoResponse {
    let table = state.engine.rates();
    Json(RatesResponse {
        rates: table.entries(),
        fiat: Currency::ALL
            .into_iter()
            .map(|c| (c, table.fiat_rate(c)))
            .collect(),
        conversion_fee_ratio: CONVERSION_FEE_RATIO,
    })
}

/// `POST /accounts`: first interaction of a user.
async fn open_account_handler(
    State(state): State<AppState>,
    body: Result<Json<OpenAccountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let account = run(&state, "open_account", move |engine| {
        let profile = Profile {
            first_name: req.first_name,
            last_name: req.last_name,
            username: req.username,
        };
        engine.open_account(req.user_id, profile, req.referral_code.as_deref())
    })
    .await?;

    state.metrics.accounts_opened_total.inc();
    Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
}

/// `GET /accounts/:id`
async fn account_handler(
    path: Result<Path<UserId>, PathRejection>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let Path(user_id) = path?;
    let account = run(&state, "account", move |engine| engine.account(user_id)).await?;
    Ok(Json(account.into()))
}

/// `GET /accounts/:id/transactions`
async fn history_handler(
    path: Result<Path<UserId>, PathRejection>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(user_id) = path?;
    let history = run(&state, "history", move |engine| engine.history(user_id)).await?;
    Ok(Json(history))
}

/// `POST /accounts/:id/convert`
async fn convert_handler(
    path: Result<Path<UserId>, PathRejection>,
    State(state): State<AppState>,
    body: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(user_id) = path?;
    let Json(req) = body?;
    let receipt = run(&state, "convert", move |engine| {
        let from: Currency = req.from.parse()?;
        let to: Currency = req.to.parse()?;
        let amount = parse_amount(&req.amount)?;
        engine.convert(user_id, from, to, amount)
    })
    .await?;
    Ok(Json(receipt))
}

/// `POST /accounts/:id/wager`
async fn wager_handler(
    path: Result<Path<UserId>, PathRejection>,
    State(state): State<AppState>,
    body: Result<Json<WagerRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(user_id) = path?;
    let Json(req) = body?;
    let outcome = run(&state, "wager", move |engine| {
        let currency: Currency = req.currency.parse()?;
        let amount = parse_amount(&req.amount)?;
        engine.wager(user_id, currency, amount)
    })
    .await?;
    Ok(Json(outcome))
}

/// `POST /accounts/:id/withdraw`
async fn withdraw_handler(
    path: Result<Path<UserId>, PathRejection>,
    State(state): State<AppState>,
    body: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(user_id) = path?;
    let Json(req) = body?;
    let receipt = run(&state, "withdraw", move |engine| {
        let currency: Currency = req.currency.parse()?;
        let amount = parse_amount(&req.amount)?;
        engine.withdraw(user_id, currency, amount, &req.method, &req.details)
    })
    .await?;
    Ok(Json(receipt))
}

/// `POST /accounts/:id/referral`
async fn referral_handler(
    path: Result<Path<UserId>, PathRejection>,
    State(state): State<AppState>,
    body: Result<Json<ReferralRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(user_id) = path?;
    let Json(req) = body?;
    let receipt = run(&state, "referral", move |engine| {
        engine.apply_referral(user_id, &req.code)
    })
    .await?;
    Ok(Json(receipt))
}

/// `POST /accounts/:id/referral/settle`
async fn settle_referral_handler(
    path: Result<Path<UserId>, PathRejection>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(user_id) = path?;
    let receipt = run(&state, "referral_settle", move |engine| {
        engine.settle_pending_referral(user_id)
    })
    .await?;
    Ok(Json(SettleResponse {
        settled: receipt.is_some(),
        receipt,
    }))
}

/// `POST /accounts/:id/grant`
async fn grant_handler(
    path: Result<Path<UserId>, PathRejection>,
    State(state): State<AppState>,
    body: Result<Json<GrantRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(user_id) = path?;
    let Json(req) = body?;
    let balances = run(&state, "grant", move |engine| {
        let currency: Currency = req.currency.parse()?;
        let amount = parse_amount(&req.amount)?;
        engine.grant(user_id, currency, amount, &req.reason)
    })
    .await?;
    Ok(Json(serde_json::json!({ "balances": balances })))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
