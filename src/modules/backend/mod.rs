//! Backend adapter boundary
//!
//! The hosted auth provider and the document database are consumed through
//! the [`AuthProvider`] and [`DocumentStore`] traits. Adapters:
//! - [`MemoryBackend`]: in-process, used for development and tests
//! - [`PostgresDocumentStore`]: JSONB documents with a LISTEN/NOTIFY change feed
//! - [`LogtoAuthProvider`]: Logto Management API credentials with expiring sessions

mod logto;
mod memory;
mod postgres;

pub use logto::{LogtoAuthProvider, LogtoTokenManager};
pub use memory::MemoryBackend;
pub use postgres::PostgresDocumentStore;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;

/// Key the backend recognises as "replace with server time on write"
const SERVER_TIMESTAMP_KEY: &str = ".sv";
const SERVER_TIMESTAMP_VALUE: &str = "timestamp";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already in use")]
    EmailInUse,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Malformed backend data: {0}")]
    Malformed(String),
}

/// Provider-side session, as announced on the session channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSession {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Backend-native timestamp stored inside documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteTimestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl RemoteTimestamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            nanos: at.timestamp_subsec_nanos(),
        }
    }

    /// `None` when the stored value is out of chrono's range
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos).single()
    }

    fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Sentinel that the backend resolves to its own clock at write time
pub fn server_timestamp() -> Value {
    let mut sentinel = serde_json::Map::new();
    sentinel.insert(
        SERVER_TIMESTAMP_KEY.to_string(),
        Value::String(SERVER_TIMESTAMP_VALUE.to_string()),
    );
    Value::Object(sentinel)
}

fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|o| o.get(SERVER_TIMESTAMP_KEY))
        .and_then(Value::as_str)
        == Some(SERVER_TIMESTAMP_VALUE)
}

/// Replace every top-level sentinel field with `now`
pub(crate) fn resolve_server_timestamps(data: &mut Value, now: DateTime<Utc>) {
    if let Some(fields) = data.as_object_mut() {
        for value in fields.values_mut() {
            if is_server_timestamp(value) {
                *value = json!(RemoteTimestamp::from_datetime(now));
            }
        }
    }
}

/// Shallow merge of `patch` into `target`
pub(crate) fn merge_fields(target: &mut Value, patch: Value) -> Result<(), BackendError> {
    let (Some(target), Value::Object(patch)) = (target.as_object_mut(), patch) else {
        return Err(BackendError::Rejected(
            "update payload must be an object".to_string(),
        ));
    };
    for (key, value) in patch {
        target.insert(key, value);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RemoteDocument {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub id: String,
}

/// Full ordered contents of a collection after a change
#[derive(Debug, Clone)]
pub struct CollectionSnapshot {
    pub documents: Vec<RemoteDocument>,
    /// Empty when the snapshot is a resync rather than a reaction to a known change
    pub changes: Vec<DocumentChange>,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }

    #[allow(dead_code)]
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }
}

/// Sort documents on one field; documents missing the field sort last
pub(crate) fn sort_documents(documents: &mut [RemoteDocument], order: &OrderBy) {
    documents.sort_by(|a, b| {
        let ordering = compare_field(a.data.get(&order.field), b.data.get(&order.field));
        match (a.data.get(&order.field), b.data.get(&order.field)) {
            (Some(_), Some(_)) if order.descending => ordering.reverse(),
            _ => ordering,
        }
    });
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            if let (Some(a), Some(b)) = (RemoteTimestamp::from_value(a), RemoteTimestamp::from_value(b)) {
                return a.cmp(&b);
            }
            if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            }
            a.to_string().cmp(&b.to_string())
        }
    }
}

pub type SnapshotStream = BoxStream<'static, Result<CollectionSnapshot, BackendError>>;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<RemoteSession, BackendError>;

    /// Create a credential and sign it in
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<RemoteSession, BackendError>;

    async fn update_display_name(&self, uid: &str, name: &str) -> Result<(), BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Current provider session; changes on sign-in, sign-out and expiry
    fn sessions(&self) -> watch::Receiver<Option<RemoteSession>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert with a backend-assigned id, returning the id
    async fn add(&self, collection: &str, data: Value) -> Result<String, BackendError>;

    /// Create or overwrite the document at `id`
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError>;

    /// Merge fields into an existing document; `NotFound` if absent
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), BackendError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RemoteDocument>, BackendError>;

    async fn query(
        &self,
        collection: &str,
        order: &OrderBy,
    ) -> Result<Vec<RemoteDocument>, BackendError>;

    /// Standing change feed. The first item is the current contents.
    async fn subscribe(
        &self,
        collection: &str,
        order: OrderBy,
    ) -> Result<SnapshotStream, BackendError>;
}
