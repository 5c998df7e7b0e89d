use axum::{extract::State, Json};
use std::sync::Arc;

use crate::core::error::AppError;
use crate::features::dashboard::dtos::*;
use crate::features::dashboard::services::DashboardService;
use crate::features::session::guards::RequireAdmin;
use crate::features::session::models::User;
use crate::shared::types::ApiResponse;

/// Aggregates over every report (admin only)
#[utoipa::path(
    get,
    path = "/api/dashboard/stats",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Dashboard aggregates", body = ApiResponse<DashboardStatsDto>),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn get_stats(
    RequireAdmin(_admin): RequireAdmin,
    State(service): State<Arc<DashboardService>>,
) -> Result<Json<ApiResponse<DashboardStatsDto>>, AppError> {
    Ok(Json(ApiResponse::success(Some(service.stats()), None, None)))
}

/// The signed-in user's own report counts
#[utoipa::path(
    get,
    path = "/api/dashboard/me",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Own report counts", body = ApiResponse<CitizenSummaryDto>),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn get_my_summary(
    user: User,
    State(service): State<Arc<DashboardService>>,
) -> Result<Json<ApiResponse<CitizenSummaryDto>>, AppError> {
    let summary = service.citizen_summary(&user.id);
    Ok(Json(ApiResponse::success(Some(summary), None, None)))
}
