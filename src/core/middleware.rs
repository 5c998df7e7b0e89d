use crate::core::context::AppContext;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Span;
use uuid::Uuid;

/// Request ID generator using UUID v7 (time-ordered)
#[derive(Clone, Copy)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Custom MakeSpan that includes request_id in the tracing span
#[derive(Clone, Debug)]
pub struct MakeSpanWithRequestId;

impl<B> tower_http::trace::MakeSpan<B> for MakeSpanWithRequestId {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    // If origins list contains "*", allow any origin
    if allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Put the store's current user into request extensions.
///
/// Requests pass through unchanged when nobody is signed in; handlers that
/// need a user reject them through their extractor.
pub async fn session_middleware(
    State(context): State<Arc<AppContext>>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(user) = context.current_user() {
        req.extensions_mut().insert(user);
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::session::models::{User, UserRole};
    use crate::shared::test_helpers::{memory_context, signed_in_context};
    use axum::{body::Body, http::StatusCode, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn who(user: Option<Extension<User>>) -> String {
        user.map(|Extension(u)| u.name).unwrap_or_default()
    }

    fn app(context: Arc<AppContext>) -> Router {
        Router::new()
            .route("/who", get(who))
            .layer(axum::middleware::from_fn_with_state(
                context,
                session_middleware,
            ))
    }

    async fn body_text(response: Response) -> String {
        let bytes = tokio_test::assert_ok!(
            axum::body::to_bytes(response.into_body(), usize::MAX).await
        );
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_signed_in_user_is_attached() {
        let (ctx, _backend, _user) = signed_in_context("Jane", UserRole::Citizen).await;
        let request = axum::http::Request::builder()
            .uri("/who")
            .body(Body::empty())
            .unwrap();

        let response = app(ctx).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Jane");
    }

    #[tokio::test]
    async fn test_signed_out_request_passes_through() {
        let (ctx, _backend) = memory_context();
        let request = axum::http::Request::builder()
            .uri("/who")
            .body(Body::empty())
            .unwrap();

        let response = app(ctx).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
    }

    #[test]
    fn test_request_ids_are_uuid_v7() {
        let request = axum::http::Request::builder().body(()).unwrap();
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let parsed = Uuid::parse_str(id.header_value().to_str().unwrap()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }
}
