//! Request Handlers
//!
//! Thin wrappers over [`Casino`]: parse the request, call one engine
//! operation, map its error onto the HTTP envelope.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::admin::AdminReceipt;
use crate::bonus::BonusReceipt;
use crate::casino::{turn_based_kind, Casino, Reconciliation};
use crate::crash::RoundView;
use crate::errors::WagerError;
use crate::games::types::{ResolutionView, SessionView};
use crate::ledger::{AccountId, AdjustmentId, AdminAdjustment, EntryId, HistoryPage, LedgerEntry, Page};
use crate::rollback::{ResetResult, ToggleResult};

/// Shared application state
pub struct AppState {
    pub casino: Arc<Casino>,
    pub version: String,
    pub enable_metrics: bool,
}

impl AppState {
    pub fn new(casino: Arc<Casino>, enable_metrics: bool) -> Self {
        Self {
            casino,
            version: env!("CARGO_PKG_VERSION").to_string(),
            enable_metrics,
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn wager(request_id: &RequestId) -> impl FnOnce(WagerError) -> ApiError + '_ {
    move |err| ApiError::from_wager(request_id.0.clone(), err)
}

fn invalid(request_id: &RequestId) -> impl FnOnce(crate::errors::ValidationError) -> ApiError + '_ {
    move |err| ApiError::from_wager(request_id.0.clone(), err.into())
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "Running".to_string(), version: state.version.clone() })
}

/// GET /accounts/:id/balance
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account): Path<AccountId>,
) -> ApiResult<BalanceResponse> {
    let acc = state.casino.get_account(account).map_err(wager(&request_id))?;
    Ok(Json(BalanceResponse {
        account: acc.id,
        balance: acc.balance,
        blocked: acc.blocked,
        best_crash_multiplier: acc.best_crash_multiplier,
    }))
}

/// GET /accounts/:id/history
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account): Path<AccountId>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryPage> {
    let filter = query.filter().map_err(invalid(&request_id))?;
    let page = query.page_request().map_err(invalid(&request_id))?;
    let history = state.casino.get_history(account, &filter, page).map_err(wager(&request_id))?;
    Ok(Json(history))
}

/// GET /accounts/:id/reconcile
pub async fn reconcile_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account): Path<AccountId>,
) -> ApiResult<Reconciliation> {
    Ok(Json(state.casino.reconcile(account).map_err(wager(&request_id))?))
}

/// GET /ledger/:entry_id
pub async fn entry_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<EntryId>,
) -> ApiResult<LedgerEntry> {
    Ok(Json(state.casino.get_entry(entry_id).map_err(wager(&request_id))?))
}

/// POST /games/:game/start
pub async fn start_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game): Path<String>,
    Json(req): Json<StartGameRequest>,
) -> ApiResult<SessionView> {
    let kind = turn_based_kind(&game).map_err(invalid(&request_id))?;
    let params = req.params(kind).map_err(invalid(&request_id))?;
    let view = state
        .casino
        .start_turn_based_game(req.account, kind, req.stake, params)
        .map_err(wager(&request_id))?;
    Ok(Json(view))
}

/// POST /games/:game/turn
pub async fn turn_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game): Path<String>,
    Json(req): Json<TurnRequest>,
) -> ApiResult<SessionView> {
    let kind = turn_based_kind(&game).map_err(invalid(&request_id))?;
    let view = state.casino.play_turn(req.account, kind, req.action).map_err(wager(&request_id))?;
    Ok(Json(view))
}

/// POST /games/:game/cashout
pub async fn cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game): Path<String>,
    Json(req): Json<AccountRequest>,
) -> ApiResult<ResolutionView> {
    let kind = turn_based_kind(&game).map_err(invalid(&request_id))?;
    Ok(Json(state.casino.cash_out(req.account, kind).map_err(wager(&request_id))?))
}

/// POST /games/:game/forfeit
pub async fn forfeit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game): Path<String>,
    Json(req): Json<AccountRequest>,
) -> ApiResult<ResolutionView> {
    let kind = turn_based_kind(&game).map_err(invalid(&request_id))?;
    Ok(Json(state.casino.forfeit(req.account, kind).map_err(wager(&request_id))?))
}

/// POST /crash/start
pub async fn crash_start_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CrashStartRequest>,
) -> ApiResult<RoundView> {
    let round = state
        .casino
        .start_crash_round(req.account, req.stake, req.auto_cashout)
        .map_err(wager(&request_id))?;
    Ok(Json(round))
}

/// POST /bonus/hourly
pub async fn hourly_bonus_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<HourlyRequest>,
) -> ApiResult<BonusReceipt> {
    Ok(Json(state.casino.claim_hourly(req.account, req.guess).map_err(wager(&request_id))?))
}

/// POST /bonus/wheel
pub async fn wheel_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<WheelRequest>,
) -> ApiResult<BonusReceipt> {
    Ok(Json(state.casino.spin_wheel(req.account, req.paid).map_err(wager(&request_id))?))
}

/// POST /promos/:code/redeem
pub async fn redeem_promo_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<AccountRequest>,
) -> ApiResult<BonusReceipt> {
    Ok(Json(state.casino.redeem_promo(req.account, &code).map_err(wager(&request_id))?))
}

/// POST /crash/cashout
pub async fn crash_cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccountRequest>,
) -> ApiResult<ResolutionView> {
    Ok(Json(state.casino.crash_cash_out(req.account).map_err(wager(&request_id))?))
}

/// POST /admin/ledger/:entry_id/rollback
pub async fn rollback_entry_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<EntryId>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<ToggleResult> {
    Ok(Json(state.casino.rollback_game(entry_id, req.admin_id).map_err(wager(&request_id))?))
}

/// POST /admin/adjustments/:id/rollback
pub async fn rollback_adjustment_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(adjustment_id): Path<AdjustmentId>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<ToggleResult> {
    let result = state
        .casino
        .rollback_admin_adjustment(adjustment_id, req.admin_id)
        .map_err(wager(&request_id))?;
    Ok(Json(result))
}

/// GET /admin/adjustments
pub async fn adjustments_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdjustmentQuery>,
) -> ApiResult<Page<AdminAdjustment>> {
    let page = query.page_request().map_err(invalid(&request_id))?;
    let list = state
        .casino
        .admin()
        .list_adjustments(&query.filter(), page)
        .map_err(wager(&request_id))?;
    Ok(Json(list))
}

/// POST /admin/accounts/:id/balance
pub async fn admin_balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account): Path<AccountId>,
    Json(req): Json<BalanceAdjustRequest>,
) -> ApiResult<AdminReceipt> {
    let admin = state.casino.admin();
    let receipt = match req.operation {
        BalanceOperation::Add => admin.add_balance(req.admin_id, account, req.amount),
        BalanceOperation::Sub => admin.sub_balance(req.admin_id, account, req.amount),
        BalanceOperation::Set => admin.set_balance(req.admin_id, account, req.amount),
    };
    Ok(Json(receipt.map_err(wager(&request_id))?))
}

/// POST /admin/accounts/:id/block
pub async fn block_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account): Path<AccountId>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<AdminReceipt> {
    Ok(Json(state.casino.admin().block_user(req.admin_id, account).map_err(wager(&request_id))?))
}

/// POST /admin/accounts/:id/unblock
pub async fn unblock_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account): Path<AccountId>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<AdminReceipt> {
    Ok(Json(state.casino.admin().unblock_user(req.admin_id, account).map_err(wager(&request_id))?))
}

/// POST /admin/accounts/:id/reset
pub async fn reset_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(account): Path<AccountId>,
    Json(req): Json<ResetRequest>,
) -> ApiResult<ResetResult> {
    if !req.confirm {
        return Err(ApiError::bad_request(
            request_id.0,
            "Reset deletes the account history permanently; resend with confirm=true".to_string(),
        ));
    }
    Ok(Json(state.casino.reset_account(account, req.admin_id).map_err(wager(&request_id))?))
}

/// POST /admin/promos
pub async fn create_promo_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PromoRequest>,
) -> Result<(StatusCode, Json<AdminReceipt>), ApiError> {
    let receipt = state
        .casino
        .admin()
        .create_promo_with_limits(req.admin_id, &req.code, req.reward, req.limits())
        .map_err(wager(&request_id))?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// DELETE /admin/promos/:code?admin_id=N
pub async fn delete_promo_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(query): Query<AdminQuery>,
) -> ApiResult<AdminReceipt> {
    Ok(Json(state.casino.admin().delete_promo(query.admin_id, &code).map_err(wager(&request_id))?))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    if !state.enable_metrics {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.casino.metrics().to_prometheus_format(),
    )
        .into_response()
}
