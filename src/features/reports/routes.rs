use std::sync::Arc;

use axum::{
    routing::{get, patch},
    Router,
};

use crate::features::reports::handlers::{self, ReportState};
use crate::features::reports::services::ReportStore;

/// Create routes for the reports feature
///
/// Every route reads the signed-in user, so the session middleware must be
/// applied by the caller
pub fn routes(store: Arc<ReportStore>) -> Router {
    let state = ReportState { store };

    Router::new()
        .route(
            "/api/reports",
            get(handlers::list_reports).post(handlers::create_report),
        )
        .route("/api/reports/{id}", get(handlers::get_report))
        .route(
            "/api/reports/{id}/status",
            patch(handlers::update_report_status),
        )
        .with_state(state)
}
