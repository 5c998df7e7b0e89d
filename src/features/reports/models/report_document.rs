//! Stored shape of a report document (`reports` collection)

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{Report, ReportCategory, ReportLocation, ReportStatus, SyncState};
use crate::modules::backend::{server_timestamp, RemoteDocument, RemoteTimestamp};
use crate::shared::constants::{CREATED_AT_FIELD, UPDATED_AT_FIELD};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportDocument {
    title: String,
    description: String,
    category: ReportCategory,
    status: ReportStatus,
    citizen_id: String,
    citizen_name: String,
    location: ReportLocation,
    #[serde(default)]
    photos: Vec<String>,
    created_at: RemoteTimestamp,
    updated_at: RemoteTimestamp,
    #[serde(default)]
    client_ref: Option<Uuid>,
}

/// Decode a stored document into a synced mirror entry
pub fn decode_report(doc: &RemoteDocument) -> Result<Report, String> {
    let stored = ReportDocument::deserialize(&doc.data)
        .map_err(|e| format!("report {}: {}", doc.id, e))?;

    let created_at = stored
        .created_at
        .to_datetime()
        .ok_or_else(|| format!("report {}: createdAt out of range", doc.id))?;
    let updated_at = stored
        .updated_at
        .to_datetime()
        .ok_or_else(|| format!("report {}: updatedAt out of range", doc.id))?;

    Ok(Report {
        id: doc.id.clone(),
        title: stored.title,
        description: stored.description,
        category: stored.category,
        status: stored.status,
        citizen_id: stored.citizen_id,
        citizen_name: stored.citizen_name,
        location: stored.location,
        photos: stored.photos,
        created_at,
        updated_at,
        client_ref: stored.client_ref,
        sync_state: SyncState::Synced,
    })
}

/// A submission ready to be written; status is always `pending`
#[derive(Debug, Clone)]
pub struct NewReport {
    pub title: String,
    pub description: String,
    pub category: ReportCategory,
    pub citizen_id: String,
    pub citizen_name: String,
    pub location: ReportLocation,
    pub photos: Vec<String>,
    pub client_ref: Uuid,
}

impl NewReport {
    /// Document body; both timestamps are stamped by the backend
    pub fn to_document(&self) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "category": self.category,
            "status": ReportStatus::Pending,
            "citizenId": self.citizen_id,
            "citizenName": self.citizen_name,
            "location": self.location,
            "photos": self.photos,
            "clientRef": self.client_ref,
            CREATED_AT_FIELD: server_timestamp(),
            UPDATED_AT_FIELD: server_timestamp(),
        })
    }

    /// The local copy shown until the authoritative one arrives
    pub fn optimistic(&self, now: DateTime<Utc>) -> Report {
        Report {
            id: Report::local_id(self.client_ref),
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category,
            status: ReportStatus::Pending,
            citizen_id: self.citizen_id.clone(),
            citizen_name: self.citizen_name.clone(),
            location: self.location.clone(),
            photos: self.photos.clone(),
            created_at: now,
            updated_at: now,
            client_ref: Some(self.client_ref),
            sync_state: SyncState::Pending,
        }
    }
}

/// Patch written by a status update
pub fn status_patch(status: ReportStatus) -> Value {
    json!({
        "status": status,
        UPDATED_AT_FIELD: server_timestamp(),
    })
}
