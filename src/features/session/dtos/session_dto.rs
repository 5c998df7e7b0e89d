use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::features::session::models::{User, UserRole};
use crate::shared::validation::not_blank;

/// Request DTO for user registration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequestDto {
    #[validate(custom(function = "not_blank", message = "Name is required"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,

    /// Defaults to `citizen`
    #[serde(default)]
    pub role: UserRole,
}

/// Request DTO for user login
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequestDto {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponseDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl From<User> for UserResponseDto {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
        }
    }
}

/// The process-wide error field
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LastErrorDto {
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::{FreeEmail, Password};
    use fake::faker::name::en::Name;
    use fake::Fake;

    fn registration() -> RegisterRequestDto {
        RegisterRequestDto {
            name: Name().fake(),
            email: FreeEmail().fake(),
            password: Password(8..16).fake(),
            role: UserRole::Citizen,
        }
    }

    #[test]
    fn test_register_validation() {
        assert!(registration().validate().is_ok());

        let blank_name = RegisterRequestDto {
            name: "  ".to_string(),
            ..registration()
        };
        assert!(blank_name.validate().is_err());

        let short_password = RegisterRequestDto {
            password: "12345".to_string(),
            ..registration()
        };
        let errors = short_password.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));

        let bad_email = RegisterRequestDto {
            email: "not-an-email".to_string(),
            ..registration()
        };
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn test_register_role_defaults_to_citizen() {
        let dto: RegisterRequestDto = serde_json::from_str(
            r#"{"name": "Jane", "email": "jane@example.com", "password": "secret1"}"#,
        )
        .unwrap();
        assert_eq!(dto.role, UserRole::Citizen);
    }
}
