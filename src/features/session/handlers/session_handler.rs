use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::core::context::AppContext;
use crate::core::error::Result;
use crate::core::extractor::AppJson;
use crate::features::session::dtos::{
    LastErrorDto, LoginRequestDto, RegisterRequestDto, UserResponseDto,
};
use crate::features::session::models::User;
use crate::shared::types::ApiResponse;

/// State for session handlers
#[derive(Clone)]
pub struct SessionState {
    pub context: Arc<AppContext>,
    /// How long login/register wait for the subscription to publish the user
    pub user_sync_timeout: Duration,
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/session/register",
    request_body = RegisterRequestDto,
    responses(
        (status = 201, description = "Account registered and signed in", body = ApiResponse<UserResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Email already registered")
    ),
    tag = "session"
)]
pub async fn register(
    State(state): State<SessionState>,
    AppJson(dto): AppJson<RegisterRequestDto>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponseDto>>)> {
    let uid = state.context.register(&dto).await?;
    let user = state
        .context
        .session()
        .wait_for_user(&uid, state.user_sync_timeout)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            Some(user.into()),
            Some("Registration successful".to_string()),
            None,
        )),
    ))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/session/login",
    request_body = LoginRequestDto,
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<UserResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "session"
)]
pub async fn login(
    State(state): State<SessionState>,
    AppJson(dto): AppJson<LoginRequestDto>,
) -> Result<Json<ApiResponse<UserResponseDto>>> {
    dto.validate()?;

    let uid = state.context.login(&dto.email, &dto.password).await?;
    let user = state
        .context
        .session()
        .wait_for_user(&uid, state.user_sync_timeout)
        .await?;
    Ok(Json(ApiResponse::success(Some(user.into()), None, None)))
}

/// End the session and clear the report mirror
#[utoipa::path(
    post,
    path = "/api/session/logout",
    responses(
        (status = 200, description = "Signed out")
    ),
    tag = "session"
)]
pub async fn logout(State(state): State<SessionState>) -> Result<Json<ApiResponse<()>>> {
    state.context.logout().await?;
    Ok(Json(ApiResponse::success(
        None,
        Some("Signed out".to_string()),
        None,
    )))
}

/// Get the signed-in user
#[utoipa::path(
    get,
    path = "/api/session/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserResponseDto>),
        (status = 401, description = "Not signed in")
    ),
    tag = "session"
)]
pub async fn get_me(user: User) -> Result<Json<ApiResponse<UserResponseDto>>> {
    Ok(Json(ApiResponse::success(Some(user.into()), None, None)))
}

/// Read the last recorded store error
#[utoipa::path(
    get,
    path = "/api/session/error",
    responses(
        (status = 200, description = "Last error, if any", body = ApiResponse<LastErrorDto>)
    ),
    tag = "session"
)]
pub async fn get_last_error(
    State(state): State<SessionState>,
) -> Result<Json<ApiResponse<LastErrorDto>>> {
    let dto = LastErrorDto {
        error: state.context.last_error(),
    };
    Ok(Json(ApiResponse::success(Some(dto), None, None)))
}

/// Clear the last recorded store error
#[utoipa::path(
    delete,
    path = "/api/session/error",
    responses(
        (status = 200, description = "Error cleared")
    ),
    tag = "session"
)]
pub async fn clear_last_error(State(state): State<SessionState>) -> Result<Json<ApiResponse<()>>> {
    state.context.clear_error();
    Ok(Json(ApiResponse::success(None, None, None)))
}

#[cfg(test)]
mod tests {
    use crate::features::session::models::UserRole;
    use crate::shared::test_helpers::{memory_context, registration, test_app};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_register_login_logout_flow() {
        let (ctx, _backend) = memory_context();
        let server = test_app(ctx.clone());
        let dto = registration("Jane", UserRole::Citizen);

        let response = server.post("/api/session/register").json(&dto).await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["data"]["name"], "Jane");
        assert_eq!(body["data"]["role"], "citizen");

        let me = server.get("/api/session/me").await;
        me.assert_status_ok();
        assert_eq!(me.json::<Value>()["data"]["email"], dto.email.as_str());

        server.post("/api/session/logout").await.assert_status_ok();
        server
            .get("/api/session/me")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let response = server
            .post("/api/session/login")
            .json(&json!({"email": dto.email, "password": dto.password}))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["name"], "Jane");
    }

    #[tokio::test]
    async fn test_bad_login_sets_error_field() {
        let (ctx, _backend) = memory_context();
        let server = test_app(ctx);

        server
            .post("/api/session/login")
            .json(&json!({"email": "nobody@example.com", "password": "whatever"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let body: Value = server.get("/api/session/error").await.json();
        assert_eq!(
            body["data"]["error"],
            "Authentication error: Invalid email or password"
        );

        server.delete("/api/session/error").await.assert_status_ok();
        let body: Value = server.get("/api/session/error").await.json();
        assert!(body["data"]["error"].is_null());
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let (ctx, _backend) = memory_context();
        let server = test_app(ctx);

        server
            .post("/api/session/register")
            .json(&json!({"name": "Jane", "email": "jane@example.com", "password": "123"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_register_conflicts() {
        let (ctx, _backend) = memory_context();
        let server = test_app(ctx);
        let dto = registration("Jane", UserRole::Citizen);

        server
            .post("/api/session/register")
            .json(&dto)
            .await
            .assert_status(StatusCode::CREATED);
        server
            .post("/api/session/register")
            .json(&dto)
            .await
            .assert_status(StatusCode::CONFLICT);
    }
}
