use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::modules::backend::server_timestamp;
use crate::shared::constants::CREATED_AT_FIELD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Citizen,
    Admin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Citizen => write!(f, "citizen"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

/// The signed-in person as the rest of the store sees them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_citizen(&self) -> bool {
        self.role == UserRole::Citizen
    }
}

/// Role-tagged profile kept in the `users` collection, keyed by account id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl ProfileRecord {
    /// Document body for a first write; `createdAt` is stamped by the backend
    pub fn to_document(&self) -> Value {
        json!({
            "uid": self.uid,
            "name": self.name,
            "email": self.email,
            "role": self.role,
            CREATED_AT_FIELD: server_timestamp(),
        })
    }

    pub fn from_document(data: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(data)
    }

    pub fn into_user(self) -> User {
        User {
            id: self.uid,
            name: self.name,
            email: self.email,
            role: self.role,
        }
    }
}
