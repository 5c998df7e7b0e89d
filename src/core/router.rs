use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, http::StatusCode, routing::get, Router};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa_swagger_ui::SwaggerUi;

use crate::core::config::{AppConfig, SessionConfig};
use crate::core::context::AppContext;
use crate::core::middleware;
use crate::features::dashboard::{routes as dashboard_routes, DashboardService};
use crate::features::reports::routes as reports_routes;
use crate::features::session::{handlers::SessionState, routes as session_routes};

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// HTTP bridge over the store held by `context`
pub fn build_router(
    context: Arc<AppContext>,
    app: &AppConfig,
    session: &SessionConfig,
    openapi: utoipa::openapi::OpenApi,
) -> Router {
    let swagger =
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi));

    let session_state = SessionState {
        context: Arc::clone(&context),
        user_sync_timeout: session.user_sync_timeout,
    };
    let dashboard_service = Arc::new(DashboardService::new(Arc::clone(context.reports())));

    let store_routes = Router::new()
        .merge(session_routes::routes(session_state))
        .merge(reports_routes::routes(Arc::clone(context.reports())))
        .merge(dashboard_routes::routes(dashboard_service))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&context),
            middleware::session_middleware,
        ));

    Router::new()
        .merge(swagger)
        .merge(store_routes)
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(app.max_request_body_size))
        .layer(middleware::cors_layer(app.cors_allowed_origins.clone()))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use crate::shared::test_helpers::{memory_context, test_app};

    #[tokio::test]
    async fn test_health_and_docs() {
        let (ctx, _backend) = memory_context();
        let server = test_app(ctx);

        server.get("/health").await.assert_status_ok();
        let response = server.get("/health").await;
        assert!(response.headers().contains_key("x-request-id"));

        let doc = server.get("/api-docs/openapi.json").await;
        doc.assert_status_ok();
        assert!(doc.text().contains("/api/reports"));
    }
}
