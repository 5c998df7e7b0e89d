use utoipa::{Modify, OpenApi};

use crate::features::dashboard::{dtos as dashboard_dtos, handlers as dashboard_handlers};
use crate::features::reports::{
    dtos as reports_dtos, handlers as reports_handlers, models as reports_models,
};
use crate::features::session::{
    dtos as session_dtos, handlers as session_handlers, models as session_models,
};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Session
        session_handlers::register,
        session_handlers::login,
        session_handlers::logout,
        session_handlers::get_me,
        session_handlers::get_last_error,
        session_handlers::clear_last_error,
        // Reports
        reports_handlers::list_reports,
        reports_handlers::get_report,
        reports_handlers::create_report,
        reports_handlers::update_report_status,
        // Dashboard
        dashboard_handlers::get_stats,
        dashboard_handlers::get_my_summary,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Session
            session_models::UserRole,
            session_dtos::RegisterRequestDto,
            session_dtos::LoginRequestDto,
            session_dtos::UserResponseDto,
            session_dtos::LastErrorDto,
            ApiResponse<session_dtos::UserResponseDto>,
            ApiResponse<session_dtos::LastErrorDto>,
            // Reports
            reports_models::ReportStatus,
            reports_models::ReportCategory,
            reports_models::ReportLocation,
            reports_models::SyncState,
            reports_dtos::ReportDraft,
            reports_dtos::UpdateReportStatusDto,
            reports_dtos::ReportResponseDto,
            ApiResponse<Vec<reports_dtos::ReportResponseDto>>,
            ApiResponse<reports_dtos::ReportResponseDto>,
            // Dashboard
            dashboard_dtos::StatusCountsDto,
            dashboard_dtos::CategoryCountDto,
            dashboard_dtos::DashboardStatsDto,
            dashboard_dtos::CitizenSummaryDto,
            ApiResponse<dashboard_dtos::DashboardStatsDto>,
            ApiResponse<dashboard_dtos::CitizenSummaryDto>,
        )
    ),
    tags(
        (name = "session", description = "Login, registration and the current user"),
        (name = "reports", description = "Citizen reports held in the local mirror"),
        (name = "Dashboard", description = "Aggregates over the report mirror"),
    ),
    info(
        title = "Civic Report API",
        version = "0.1.0",
        description = "Local bridge over the civic report store",
    )
)]
pub struct ApiDoc;

/// Records which backend the running process is wired to
pub struct BackendInfoModifier {
    pub backend: &'static str,
}

impl Modify for BackendInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let description = openapi.info.description.take().unwrap_or_default();
        openapi.info.description = Some(format!("{} (backend: {})", description, self.backend));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_store_paths() {
        let mut doc = ApiDoc::openapi();
        BackendInfoModifier { backend: "memory" }.modify(&mut doc);

        assert!(doc.paths.paths.contains_key("/api/reports/{id}/status"));
        assert!(doc.paths.paths.contains_key("/api/session/login"));
        assert!(doc
            .info
            .description
            .is_some_and(|d| d.ends_with("(backend: memory)")));
    }
}
