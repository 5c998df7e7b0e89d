use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::features::reports::models::{
    NewReport, Report, ReportCategory, ReportFilter, ReportLocation, ReportStatus, SyncState,
};
use crate::features::session::models::User;
use crate::shared::constants::{DEFAULT_LATITUDE, DEFAULT_LONGITUDE};
use crate::shared::validation::{not_blank, photo_uris};

/// A citizen submission
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_location"))]
pub struct ReportDraft {
    #[validate(custom(function = "not_blank", message = "Title is required"))]
    pub title: String,

    #[validate(custom(function = "not_blank", message = "Description is required"))]
    pub description: String,

    pub category: ReportCategory,

    #[serde(default)]
    pub lat: Option<f64>,

    #[serde(default)]
    pub lng: Option<f64>,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "photo_uris"))]
    pub photos: Vec<String>,

    /// Ignored; new reports always start as `pending`
    #[serde(default)]
    pub status: Option<ReportStatus>,
}

fn validate_location(draft: &ReportDraft) -> Result<(), ValidationError> {
    let has_address = draft
        .address
        .as_deref()
        .is_some_and(|a| !a.trim().is_empty());

    match (draft.lat, draft.lng) {
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ValidationError::new("latitude")
                    .with_message("Latitude must be between -90 and 90".into()));
            }
            if !(-180.0..=180.0).contains(&lng) {
                return Err(ValidationError::new("longitude")
                    .with_message("Longitude must be between -180 and 180".into()));
            }
            Ok(())
        }
        (None, None) if has_address => Ok(()),
        (None, None) => Err(ValidationError::new("location")
            .with_message("Either coordinates or an address is required".into())),
        _ => Err(ValidationError::new("coordinates")
            .with_message("Latitude and longitude must be given together".into())),
    }
}

impl ReportDraft {
    /// Attach the author; coordinates fall back to the default map centre
    pub fn into_new_report(self, author: &User, client_ref: Uuid) -> NewReport {
        NewReport {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            category: self.category,
            citizen_id: author.id.clone(),
            citizen_name: author.name.clone(),
            location: ReportLocation {
                lat: self.lat.unwrap_or(DEFAULT_LATITUDE),
                lng: self.lng.unwrap_or(DEFAULT_LONGITUDE),
                address: self
                    .address
                    .map(|a| a.trim().to_string())
                    .unwrap_or_default(),
            },
            photos: self.photos,
            client_ref,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateReportStatusDto {
    pub status: ReportStatus,
}

/// Query parameters for listing reports
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListReportsQuery {
    pub status: Option<ReportStatus>,
    pub category: Option<ReportCategory>,
    /// Only the signed-in user's reports
    pub mine: Option<bool>,
}

impl ListReportsQuery {
    pub fn to_filter(&self, user: &User) -> ReportFilter {
        ReportFilter {
            status: self.status,
            category: self.category,
            citizen_id: self
                .mine
                .unwrap_or(false)
                .then(|| user.id.clone()),
        }
    }
}

/// Response DTO for report
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportResponseDto {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: ReportCategory,
    pub status: ReportStatus,
    pub citizen_id: String,
    pub citizen_name: String,
    pub location: ReportLocation,
    pub photos: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_state: SyncState,
}

impl From<Report> for ReportResponseDto {
    fn from(r: Report) -> Self {
        Self {
            id: r.id,
            title: r.title,
            description: r.description,
            category: r.category,
            status: r.status,
            citizen_id: r.citizen_id,
            citizen_name: r.citizen_name,
            location: r.location,
            photos: r.photos,
            created_at: r.created_at,
            updated_at: r.updated_at,
            sync_state: r.sync_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::session::models::UserRole;

    fn draft() -> ReportDraft {
        ReportDraft {
            title: "Pothole".to_string(),
            description: "Deep pothole on Main St".to_string(),
            category: ReportCategory::Infrastructure,
            lat: Some(40.7),
            lng: Some(-74.0),
            address: None,
            photos: vec!["https://cdn.example.org/p.jpg".to_string()],
            status: None,
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn test_blank_title_rejected() {
        let d = ReportDraft {
            title: " ".to_string(),
            ..draft()
        };
        let errors = d.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("title"));
    }

    #[test]
    fn test_location_rules() {
        let out_of_range = ReportDraft {
            lat: Some(91.0),
            ..draft()
        };
        assert!(out_of_range.validate().is_err());

        let half = ReportDraft {
            lng: None,
            ..draft()
        };
        assert!(half.validate().is_err());

        let nowhere = ReportDraft {
            lat: None,
            lng: None,
            ..draft()
        };
        assert!(nowhere.validate().is_err());

        let address_only = ReportDraft {
            lat: None,
            lng: None,
            address: Some("5th Ave & 42nd St".to_string()),
            ..draft()
        };
        assert!(address_only.validate().is_ok());
    }

    #[test]
    fn test_bad_photo_rejected() {
        let d = ReportDraft {
            photos: vec!["ftp://host/p.jpg".to_string()],
            ..draft()
        };
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_into_new_report_defaults_coordinates() {
        let author = User {
            id: "u1".to_string(),
            name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            role: UserRole::Citizen,
        };
        let d = ReportDraft {
            lat: None,
            lng: None,
            address: Some("  City Hall ".to_string()),
            status: Some(ReportStatus::Resolved),
            ..draft()
        };
        let new = d.into_new_report(&author, Uuid::new_v4());
        assert_eq!(new.location.lat, DEFAULT_LATITUDE);
        assert_eq!(new.location.lng, DEFAULT_LONGITUDE);
        assert_eq!(new.location.address, "City Hall");
        assert_eq!(new.citizen_name, "Jane");
        assert_eq!(new.to_document()["status"], "pending");
    }

    #[test]
    fn test_list_query_mine() {
        let user = User {
            id: "u9".to_string(),
            name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            role: UserRole::Citizen,
        };
        let query = ListReportsQuery {
            mine: Some(true),
            ..Default::default()
        };
        assert_eq!(query.to_filter(&user).citizen_id.as_deref(), Some("u9"));
        assert!(ListReportsQuery::default()
            .to_filter(&user)
            .citizen_id
            .is_none());
    }
}
