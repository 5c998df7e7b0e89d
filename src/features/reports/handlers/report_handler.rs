use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::core::error::{AppError, Result};
use crate::core::extractor::AppJson;
use crate::features::reports::dtos::{
    ListReportsQuery, ReportDraft, ReportResponseDto, UpdateReportStatusDto,
};
use crate::features::reports::services::ReportStore;
use crate::features::session::guards::{RequireAdmin, RequireCitizen};
use crate::features::session::models::User;
use crate::shared::types::{ApiResponse, Meta, PaginationQuery};

/// State for report handlers
#[derive(Clone)]
pub struct ReportState {
    pub store: Arc<ReportStore>,
}

/// List reports from the mirror, newest first
#[utoipa::path(
    get,
    path = "/api/reports",
    params(ListReportsQuery, PaginationQuery),
    responses(
        (status = 200, description = "Reports in the mirror", body = ApiResponse<Vec<ReportResponseDto>>),
        (status = 401, description = "Not signed in")
    ),
    tag = "reports"
)]
pub async fn list_reports(
    user: User,
    State(state): State<ReportState>,
    Query(query): Query<ListReportsQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<ApiResponse<Vec<ReportResponseDto>>>> {
    let reports = state.store.filter(&query.to_filter(&user));
    let total = reports.len();
    let dtos: Vec<ReportResponseDto> = pagination
        .apply(reports)
        .into_iter()
        .map(ReportResponseDto::from)
        .collect();

    Ok(Json(ApiResponse::success(
        Some(dtos),
        None,
        Some(Meta { total }),
    )))
}

/// Get report by ID
#[utoipa::path(
    get,
    path = "/api/reports/{id}",
    params(
        ("id" = String, Path, description = "Report ID")
    ),
    responses(
        (status = 200, description = "Report found", body = ApiResponse<ReportResponseDto>),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Report not found")
    ),
    tag = "reports"
)]
pub async fn get_report(
    _user: User,
    State(state): State<ReportState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ReportResponseDto>>> {
    let report = state
        .store
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Report {} not found", id)))?;
    Ok(Json(ApiResponse::success(Some(report.into()), None, None)))
}

/// Submit a report (citizen only)
#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = ReportDraft,
    responses(
        (status = 201, description = "Report submitted", body = ApiResponse<ReportResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not a citizen"),
        (status = 502, description = "Remote write failed")
    ),
    tag = "reports"
)]
pub async fn create_report(
    RequireCitizen(_user): RequireCitizen,
    State(state): State<ReportState>,
    AppJson(draft): AppJson<ReportDraft>,
) -> Result<(StatusCode, Json<ApiResponse<ReportResponseDto>>)> {
    let report = state.store.add_report(draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            Some(report.into()),
            Some("Report submitted".to_string()),
            None,
        )),
    ))
}

/// Update report status (admin only)
#[utoipa::path(
    patch,
    path = "/api/reports/{id}/status",
    params(
        ("id" = String, Path, description = "Report ID")
    ),
    request_body = UpdateReportStatusDto,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<ReportResponseDto>),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Report not found"),
        (status = 502, description = "Remote write failed")
    ),
    tag = "reports"
)]
pub async fn update_report_status(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<ReportState>,
    Path(id): Path<String>,
    AppJson(dto): AppJson<UpdateReportStatusDto>,
) -> Result<Json<ApiResponse<ReportResponseDto>>> {
    let report = state
        .store
        .update_report_status(&id, dto.status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Report {} is not in the mirror yet", id)))?;
    Ok(Json(ApiResponse::success(Some(report.into()), None, None)))
}
