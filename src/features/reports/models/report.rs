use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::shared::constants::LOCAL_ID_PREFIX;

/// Report status as stored in documents. Any status may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Pending,
    InProgress,
    Resolved,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "pending"),
            ReportStatus::InProgress => write!(f, "in-progress"),
            ReportStatus::Resolved => write!(f, "resolved"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportCategory {
    Infrastructure,
    Environment,
    Safety,
    Other,
}

impl ReportCategory {
    /// Declaration order, used for breakdowns
    pub const ALL: [ReportCategory; 4] = [
        ReportCategory::Infrastructure,
        ReportCategory::Environment,
        ReportCategory::Safety,
        ReportCategory::Other,
    ];
}

impl std::fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportCategory::Infrastructure => write!(f, "infrastructure"),
            ReportCategory::Environment => write!(f, "environment"),
            ReportCategory::Safety => write!(f, "safety"),
            ReportCategory::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportLocation {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

/// Whether a mirror entry came from an authoritative snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Synced,
    /// Written locally, not yet seen in a snapshot
    Pending,
}

/// One entry of the report mirror
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
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
    /// Set on reports submitted through this store; matches the optimistic
    /// entry to its authoritative copy
    pub client_ref: Option<Uuid>,
    pub sync_state: SyncState,
}

impl Report {
    pub fn local_id(client_ref: Uuid) -> String {
        format!("{}{}", LOCAL_ID_PREFIX, client_ref)
    }

    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::Pending
    }
}

/// Optional constraints over the mirror; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub category: Option<ReportCategory>,
    pub citizen_id: Option<String>,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        self.status.map_or(true, |s| report.status == s)
            && self.category.map_or(true, |c| report.category == c)
            && self
                .citizen_id
                .as_deref()
                .map_or(true, |id| report.citizen_id == id)
    }
}
