//! Unified API router
//!
//! Combines the route sets of all modules into a single router so the server
//! setup has one place to look.

use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use crate::main_module::{health_check, tail_logs};
use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // ===== Inventory =====
        .merge(crate::inventory::configure())
        // ===== Orders & dashboard =====
        .merge(crate::orders::configure())
        // ===== Payment verification & provider webhooks =====
        .merge(crate::payments::configure())
        // ===== Realtime channel & machine status =====
        .merge(crate::realtime::configure())
        // ===== Image upload & serving =====
        .merge(crate::uploads::configure())
        // ===== Health & logs =====
        .route("/api/health", get(health_check))
        .route("/api/logs", get(tail_logs))
}
