//! Role guards for the HTTP bridge.
//!
//! The session middleware puts the signed-in [`User`] into request extensions;
//! these extractors check its role. They mirror the route protection of the
//! view layer. The store itself never checks roles.

use crate::core::error::AppError;
use crate::features::session::models::User;
use axum::{extract::FromRequestParts, http::request::Parts};

fn signed_in_user(parts: &Parts) -> Result<User, AppError> {
    parts
        .extensions
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("User not authenticated".to_string()))
}

/// Allows only `admin` users.
///
/// # Example
/// ```ignore
/// pub async fn handler(RequireAdmin(user): RequireAdmin) { ... }
/// ```
pub struct RequireAdmin(pub User);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = signed_in_user(parts)?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(RequireAdmin(user))
    }
}

/// Allows only `citizen` users
pub struct RequireCitizen(pub User);

impl<S> FromRequestParts<S> for RequireCitizen
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = signed_in_user(parts)?;
        if !user.is_citizen() {
            return Err(AppError::Forbidden("Citizen access required".to_string()));
        }
        Ok(RequireCitizen(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::session::models::UserRole;
    use axum::http::Request;

    fn parts_with(user: Option<User>) -> Parts {
        let mut request = Request::builder().uri("/").body(()).unwrap();
        if let Some(user) = user {
            request.extensions_mut().insert(user);
        }
        request.into_parts().0
    }

    fn user(role: UserRole) -> User {
        User {
            id: "u1".to_string(),
            name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_admin_guard() {
        let mut parts = parts_with(Some(user(UserRole::Admin)));
        assert!(RequireAdmin::from_request_parts(&mut parts, &()).await.is_ok());

        let mut parts = parts_with(Some(user(UserRole::Citizen)));
        let err = RequireAdmin::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mut parts = parts_with(None);
        let err = RequireAdmin::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_citizen_guard() {
        let mut parts = parts_with(Some(user(UserRole::Citizen)));
        assert!(RequireCitizen::from_request_parts(&mut parts, &())
            .await
            .is_ok());

        let mut parts = parts_with(Some(user(UserRole::Admin)));
        assert!(RequireCitizen::from_request_parts(&mut parts, &())
            .await
            .is_err());
    }
}
