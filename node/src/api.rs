//! # REST API
//!
//! Builds the axum router that exposes the vault engine over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                            | Description                          |
//! |--------|---------------------------------|--------------------------------------|
//! | GET    | `/health`                       | Liveness check                       |
//! | GET    | `/status`                       | Node and vault summary               |
//! | GET    | `/epoch`                        | Current withdrawal epoch             |
//! | GET    | `/rounds/current`               | Current round and its start price    |
//! | GET    | `/rounds/:round/price`          | Closing price of a finished round    |
//! | GET    | `/accounts/:address`            | Everything known about an account    |
//! | POST   | `/wrapper/deposit`              | Wrap the underlying                  |
//! | POST   | `/wrapper/deposit-native`       | Wrap attached native currency        |
//! | POST   | `/wrapper/withdrawals/initiate` | Queue wrapped units for withdrawal   |
//! | POST   | `/wrapper/withdrawals/complete` | Pay out a matured withdrawal         |
//! | POST   | `/wrapper/withdrawals/process`  | Advance the epoch (owner)            |
//! | POST   | `/vault/deposit`                | Deposit and stake in one step        |
//! | POST   | `/vault/stake`                  | Stake held wrapped units             |
//! | POST   | `/vault/unstake`                | Queue shares for the next roll       |
//! | POST   | `/vault/instant-unstake`        | Cancel a same-round stake            |
//! | POST   | `/vault/complete-unstake`       | Release a settled unstake            |
//! | POST   | `/vault/redeem`                 | Move unredeemed shares to balance    |
//! | POST   | `/vault/roll`                   | Close the round (keeper)             |
//! | POST   | `/admin/whitelist`              | Change whitelist membership (owner)  |
//! | POST   | `/devnet/fund`                  | Faucet for the in-memory asset       |
//!
//! Request bodies name the `caller`. Authenticating that identity happens
//! upstream of this service.
//!
//! ## Error Mapping
//!
//! | Kind            | Status |
//! |-----------------|--------|
//! | `Authorization` | 403    |
//! | `Validation`    | 422    |
//! | `Timing`        | 409    |
//! | `Arithmetic`    | 422    |
//! | `Solvency`      | 409    |
//! | storage/config  | 500    |

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use harbor_protocol::config::{EPOCH_CADENCE, ROUND_CADENCE};
use harbor_protocol::{ErrorKind, ServiceError, ServiceResult, VaultService, VaultSummary};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The engine. Every call serializes on its internal lock.
    pub service: Arc<VaultService>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Runs one engine operation, recording its outcome and latency.
    fn run<T>(
        &self,
        op: &'static str,
        call: impl FnOnce(&VaultService) -> ServiceResult<T>,
    ) -> Result<T, ApiError> {
        let started = Instant::now();
        let result = call(&self.service);
        self.metrics
            .operation_latency_seconds
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => {
                self.metrics.operations_total.with_label_values(&[op]).inc();
                if let Ok(summary) = self.service.summary() {
                    self.metrics.observe(&summary);
                }
            }
            Err(err) => {
                let kind = err
                    .kind()
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "storage".to_string());
                self.metrics
                    .rejections_total
                    .with_label_values(&[op, &kind])
                    .inc();
            }
        }
        result.map_err(ApiError::from)
    }
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
        .route("/status", get(status_handler))
        .route("/epoch", get(epoch_handler))
        .route("/rounds/current", get(current_round_handler))
        .route("/rounds/:round/price", get(round_price_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/wrapper/deposit", post(wrapper_deposit_handler))
        .route("/wrapper/deposit-native", post(wrapper_deposit_native_handler))
        .route("/wrapper/withdrawals/initiate", post(initiate_withdrawal_handler))
        .route("/wrapper/withdrawals/complete", post(complete_withdrawal_handler))
        .route("/wrapper/withdrawals/process", post(process_withdrawals_handler))
        .route("/vault/deposit", post(vault_deposit_handler))
        .route("/vault/stake", post(vault_stake_handler))
        .route("/vault/unstake", post(unstake_handler))
        .route("/vault/instant-unstake", post(instant_unstake_handler))
        .route("/vault/complete-unstake", post(complete_unstake_handler))
        .route("/vault/redeem", post(redeem_handler))
        .route("/vault/roll", post(roll_handler))
        .route("/admin/whitelist", post(whitelist_handler))
        .route("/devnet/fund", post(fund_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Ledger error kind, absent for infrastructure failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    NotFound(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

/// HTTP status for a ledger error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Validation | ErrorKind::Arithmetic => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Timing | ErrorKind::Solvency => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Service(err) => {
                let kind = err.kind();
                let status = kind.map_or(StatusCode::INTERNAL_SERVER_ERROR, status_for);
                (
                    status,
                    ErrorResponse {
                        error: err.to_string(),
                        kind,
                    },
                )
            }
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: what,
                    kind: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body for `POST /wrapper/deposit` and `/wrapper/deposit-native`.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub caller: String,
    /// Whose underlying is pulled. Defaults to the caller.
    pub depositor: Option<String>,
    pub amount: u64,
}

/// Body for operations that only need the caller.
#[derive(Debug, Deserialize)]
pub struct CallerRequest {
    pub caller: String,
}

/// Body for operations that take the caller and one quantity.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub caller: String,
    pub amount: u64,
}

/// Body for `POST /vault/deposit` and `/vault/stake`.
#[derive(Debug, Deserialize)]
pub struct StakeRequest {
    pub caller: String,
    pub amount: u64,
    /// Who is credited with the stake. Defaults to the caller.
    pub creditor: Option<String>,
}

/// Body for `POST /vault/redeem`. Omitting `shares` redeems everything.
#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub caller: String,
    pub shares: Option<u64>,
}

/// Body for `POST /vault/roll`.
#[derive(Debug, Deserialize)]
pub struct RollRequest {
    pub caller: String,
    /// Signed yield realized this round, in wrapped units.
    pub yield_delta: i64,
}

/// Body for `POST /admin/whitelist`.
#[derive(Debug, Deserialize)]
pub struct WhitelistRequest {
    pub caller: String,
    pub account: String,
    pub whitelisted: bool,
}

/// Body for `POST /devnet/fund`.
#[derive(Debug, Deserialize)]
pub struct FundRequest {
    pub caller: String,
    pub account: String,
    pub amount: u64,
    /// Also approve the wrapper for the account's whole balance.
    #[serde(default = "default_true")]
    pub approve: bool,
}

fn default_true() -> bool {
    true
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub vault: VaultSummary,
    pub persistent: bool,
    pub uptime_secs: i64,
    /// Expected keeper cadence between round rolls.
    pub round_cadence_secs: u64,
    /// Expected owner cadence between epoch advances.
    pub epoch_cadence_secs: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EpochResponse {
    pub epoch: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoundResponse {
    pub round: u16,
    pub price_per_share: u128,
    pub decimals: u8,
    pub total_pending: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoundPriceResponse {
    pub round: u16,
    pub price_per_share: u128,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AmountResponse {
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// Read Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: node and vault summary.
async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let vault = state.service.summary()?;
    let now = Utc::now();
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        vault,
        persistent: state.service.is_persistent(),
        uptime_secs: (now - state.started_at).num_seconds(),
        round_cadence_secs: ROUND_CADENCE.as_secs(),
        epoch_cadence_secs: EPOCH_CADENCE.as_secs(),
        timestamp: now.to_rfc3339(),
    }))
}

async fn epoch_handler(State(state): State<AppState>) -> Json<EpochResponse> {
    Json(EpochResponse {
        epoch: state.service.epoch(),
    })
}

async fn current_round_handler(State(state): State<AppState>) -> ApiResult<RoundResponse> {
    let summary = state.service.summary()?;
    Ok(Json(RoundResponse {
        round: summary.round,
        price_per_share: summary.price_per_share,
        decimals: summary.decimals,
        total_pending: summary.total_pending,
    }))
}

/// `GET /rounds/:round/price`: 404 until the round has closed.
async fn round_price_handler(
    State(state): State<AppState>,
    Path(round): Path<u16>,
) -> ApiResult<RoundPriceResponse> {
    match state.service.price_per_share(round) {
        Some(price_per_share) => Ok(Json(RoundPriceResponse {
            round,
            price_per_share,
        })),
        None => Err(ApiError::NotFound(format!("round {} has not closed", round))),
    }
}

async fn account_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<harbor_protocol::AccountView> {
    Ok(Json(state.service.account(&address)?))
}

// ---------------------------------------------------------------------------
// Wrapper Handlers
// ---------------------------------------------------------------------------

async fn wrapper_deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<AmountResponse> {
    let depositor = req.depositor.as_deref().unwrap_or(&req.caller);
    let balance = state.run("deposit", |s| s.deposit(&req.caller, depositor, req.amount))?;
    Ok(Json(AmountResponse { amount: balance }))
}

async fn wrapper_deposit_native_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<AmountResponse> {
    let depositor = req.depositor.as_deref().unwrap_or(&req.caller);
    let balance = state.run("deposit_native", |s| {
        s.deposit_native(&req.caller, depositor, req.amount)
    })?;
    Ok(Json(AmountResponse { amount: balance }))
}

async fn initiate_withdrawal_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<harbor_protocol::wrapper::WithdrawalReceipt> {
    let receipt = state.run("initiate_withdrawal", |s| {
        s.initiate_withdrawal(&req.caller, req.amount)
    })?;
    Ok(Json(receipt))
}

async fn complete_withdrawal_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<AmountResponse> {
    let amount = state.run("complete_withdrawal", |s| s.complete_withdrawal(&req.caller))?;
    Ok(Json(AmountResponse { amount }))
}

async fn process_withdrawals_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<harbor_protocol::wrapper::EpochSummary> {
    let summary = state.run("process_withdrawals", |s| s.process_withdrawals(&req.caller))?;
    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// Vault Handlers
// ---------------------------------------------------------------------------

async fn vault_deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<StakeRequest>,
) -> ApiResult<harbor_protocol::vault::StakeReceipt> {
    let creditor = req.creditor.as_deref().unwrap_or(&req.caller);
    let receipt = state.run("deposit_and_stake", |s| {
        s.deposit_and_stake(&req.caller, req.amount, creditor)
    })?;
    Ok(Json(receipt))
}

async fn vault_stake_handler(
    State(state): State<AppState>,
    Json(req): Json<StakeRequest>,
) -> ApiResult<harbor_protocol::vault::StakeReceipt> {
    let creditor = req.creditor.as_deref().unwrap_or(&req.caller);
    let receipt = state.run("stake", |s| s.stake(&req.caller, req.amount, creditor))?;
    Ok(Json(receipt))
}

async fn unstake_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<harbor_protocol::vault::UnstakeReceipt> {
    let receipt = state.run("unstake", |s| s.unstake(&req.caller, req.amount))?;
    Ok(Json(receipt))
}

async fn instant_unstake_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<harbor_protocol::vault::StakeReceipt> {
    let receipt = state.run("instant_unstake", |s| {
        s.instant_unstake(&req.caller, req.amount)
    })?;
    Ok(Json(receipt))
}

async fn complete_unstake_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<AmountResponse> {
    let amount = state.run("complete_unstake", |s| s.complete_unstake(&req.caller))?;
    Ok(Json(AmountResponse { amount }))
}

async fn redeem_handler(
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> ApiResult<AmountResponse> {
    let balance = match req.shares {
        Some(shares) => state.run("redeem", |s| s.redeem(&req.caller, shares))?,
        None => state.run("max_redeem", |s| s.max_redeem(&req.caller))?,
    };
    Ok(Json(AmountResponse { amount: balance }))
}

/// `POST /vault/roll`: keeper closes the current round.
async fn roll_handler(
    State(state): State<AppState>,
    Json(req): Json<RollRequest>,
) -> ApiResult<harbor_protocol::vault::RollSummary> {
    let summary = state.run("roll_to_next_round", |s| {
        s.roll_to_next_round(&req.caller, i128::from(req.yield_delta))
    })?;
    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// Admin Handlers
// ---------------------------------------------------------------------------

async fn whitelist_handler(
    State(state): State<AppState>,
    Json(req): Json<WhitelistRequest>,
) -> ApiResult<serde_json::Value> {
    state.run("set_whitelisted", |s| {
        s.set_whitelisted(&req.caller, &req.account, req.whitelisted)
    })?;
    Ok(Json(serde_json::json!({
        "account": req.account,
        "whitelisted": req.whitelisted,
    })))
}

/// `POST /devnet/fund`: owner-only faucet for the in-memory asset ledger.
async fn fund_handler(
    State(state): State<AppState>,
    Json(req): Json<FundRequest>,
) -> ApiResult<AmountResponse> {
    let balance = state.run("fund", |s| s.fund(&req.caller, &req.account, req.amount))?;
    if req.approve {
        state.run("approve", |s| s.approve(&req.caller, &req.account, balance))?;
    }
    Ok(Json(AmountResponse { amount: balance }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
