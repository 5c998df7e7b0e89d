#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use fake::faker::internet::en::FreeEmail;
use fake::Fake;
use uuid::Uuid;

use crate::core::config::{AppConfig, SessionConfig};
use crate::core::context::AppContext;
use crate::core::openapi::ApiDoc;
use crate::core::router::build_router;
use crate::features::reports::dtos::ReportDraft;
use crate::features::reports::models::ReportCategory;
use crate::features::session::dtos::RegisterRequestDto;
use crate::features::session::models::{User, UserRole};
use crate::modules::backend::MemoryBackend;

/// Upper bound for waiting on a background subscription in tests
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(2);

pub fn memory_context() -> (Arc<AppContext>, MemoryBackend) {
    let backend = MemoryBackend::new();
    let ctx = AppContext::init(Arc::new(backend.clone()), Arc::new(backend.clone()));
    (ctx, backend)
}

pub fn registration(name: &str, role: UserRole) -> RegisterRequestDto {
    let email: String = FreeEmail().fake();
    RegisterRequestDto {
        name: name.to_string(),
        email: format!("{}.{}", Uuid::new_v4().simple(), email),
        password: "secret123".to_string(),
        role,
    }
}

/// A memory-backed context with a freshly registered user already published
pub async fn signed_in_context(name: &str, role: UserRole) -> (Arc<AppContext>, MemoryBackend, User) {
    let (ctx, backend) = memory_context();
    let uid = ctx
        .register(&registration(name, role))
        .await
        .expect("registration should succeed");
    let user = ctx
        .session()
        .wait_for_user(&uid, SYNC_TIMEOUT)
        .await
        .expect("user should be published");
    (ctx, backend, user)
}

pub fn draft(title: &str) -> ReportDraft {
    ReportDraft {
        title: title.to_string(),
        description: format!("{} reported near the corner", title),
        category: ReportCategory::Infrastructure,
        lat: Some(40.7128),
        lng: Some(-74.006),
        address: None,
        photos: vec![],
        status: None,
    }
}

pub fn test_app(ctx: Arc<AppContext>) -> axum_test::TestServer {
    let app = AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_allowed_origins: vec!["*".to_string()],
        max_request_body_size: 1024 * 1024,
    };
    let session = SessionConfig {
        user_sync_timeout: SYNC_TIMEOUT,
        ..SessionConfig::default()
    };
    let router = build_router(ctx, &app, &session, <ApiDoc as utoipa::OpenApi>::openapi());
    axum_test::TestServer::new(router).expect("test server should start")
}
