//! Route Definitions

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use super::{handlers::*, websocket::crash_ws_handler};

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Player reads
        .route("/accounts/:id/balance", get(balance_handler))
        .route("/accounts/:id/history", get(history_handler))
        .route("/accounts/:id/reconcile", get(reconcile_handler))
        .route("/ledger/:entry_id", get(entry_handler))
        // Turn-based games
        .route("/games/:game/start", post(start_game_handler))
        .route("/games/:game/turn", post(turn_handler))
        .route("/games/:game/cashout", post(cashout_handler))
        .route("/games/:game/forfeit", post(forfeit_handler))
        // Crash
        .route("/crash/start", post(crash_start_handler))
        .route("/crash/cashout", post(crash_cashout_handler))
        .route("/crash/ws/:account", get(crash_ws_handler))
        // Bonuses
        .route("/bonus/hourly", post(hourly_bonus_handler))
        .route("/bonus/wheel", post(wheel_handler))
        .route("/promos/:code/redeem", post(redeem_promo_handler))
        // Admin
        .route("/admin/ledger/:entry_id/rollback", post(rollback_entry_handler))
        .route("/admin/adjustments", get(adjustments_handler))
        .route("/admin/adjustments/:id/rollback", post(rollback_adjustment_handler))
        .route("/admin/accounts/:id/balance", post(admin_balance_handler))
        .route("/admin/accounts/:id/block", post(block_handler))
        .route("/admin/accounts/:id/unblock", post(unblock_handler))
        .route("/admin/accounts/:id/reset", post(reset_handler))
        .route("/admin/promos", post(create_promo_handler))
        .route("/admin/promos/:code", delete(delete_promo_handler))
        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
