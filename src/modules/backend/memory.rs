use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::{
    merge_fields, resolve_server_timestamps, sort_documents, AuthProvider, BackendError,
    ChangeKind, CollectionSnapshot, DocumentChange, DocumentStore, OrderBy, RemoteDocument,
    RemoteSession, SnapshotStream,
};
use crate::shared::constants::MIN_PASSWORD_LENGTH;

type HmacSha256 = Hmac<Sha256>;

const CHANGE_FEED_CAPACITY: usize = 256;

struct Account {
    uid: String,
    email: String,
    display_name: Option<String>,
    salt: String,
    digest: String,
}

#[derive(Debug, Clone)]
struct CollectionEvent {
    collection: String,
    change: DocumentChange,
}

struct Inner {
    secret: Vec<u8>,
    accounts: RwLock<HashMap<String, Account>>,
    sessions: watch::Sender<Option<RemoteSession>>,
    collections: RwLock<HashMap<String, Vec<RemoteDocument>>>,
    changes: broadcast::Sender<CollectionEvent>,
    last_timestamp: Mutex<DateTime<Utc>>,
    injected_failure: Mutex<Option<BackendError>>,
}

/// In-process auth provider and document store.
///
/// Credentials are kept as salted HMAC-SHA256 digests. Every write is
/// published on a broadcast change feed; subscribers re-read the collection
/// and receive a full snapshot.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (sessions, _) = watch::channel(None);
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let mut secret = Uuid::new_v4().as_bytes().to_vec();
        secret.extend_from_slice(Uuid::new_v4().as_bytes());

        Self {
            inner: Arc::new(Inner {
                secret,
                accounts: RwLock::new(HashMap::new()),
                sessions,
                collections: RwLock::new(HashMap::new()),
                changes,
                last_timestamp: Mutex::new(DateTime::<Utc>::MIN_UTC),
                injected_failure: Mutex::new(None),
            }),
        }
    }

    /// Make the next document write fail with `error`
    #[allow(dead_code)]
    pub fn fail_next_write(&self, error: BackendError) {
        let mut slot = self
            .inner
            .injected_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(error);
    }

    /// Drop the current session as if its token had lapsed
    #[allow(dead_code)]
    pub fn expire_session(&self) {
        tracing::debug!("Expiring in-memory session");
        self.inner.sessions.send_replace(None);
    }

    /// Write a document without resolving sentinels or checking its shape
    #[allow(dead_code)]
    pub async fn insert_raw(&self, collection: &str, id: &str, data: Value) {
        self.inner
            .collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(RemoteDocument {
                id: id.to_string(),
                data,
            });
        self.inner.publish(collection, ChangeKind::Added, id);
    }
}

impl Inner {
    fn digest(&self, salt: &str, password: &str) -> Result<String, BackendError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| BackendError::Unavailable(format!("HMAC key rejected: {}", e)))?;
        mac.update(salt.as_bytes());
        mac.update(password.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, account: &Account, password: &str) -> bool {
        let Ok(expected) = hex::decode(&account.digest) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(account.salt.as_bytes());
        mac.update(password.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    /// Server clock; strictly increasing across writes
    fn now(&self) -> DateTime<Utc> {
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut now = Utc::now();
        if now <= *last {
            now = *last + Duration::microseconds(1);
        }
        *last = now;
        now
    }

    fn take_failure(&self) -> Result<(), BackendError> {
        let mut slot = self
            .injected_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match slot.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn publish(&self, collection: &str, kind: ChangeKind, id: &str) {
        // no receivers is fine: nobody is subscribed yet
        let _ = self.changes.send(CollectionEvent {
            collection: collection.to_string(),
            change: DocumentChange {
                kind,
                id: id.to_string(),
            },
        });
    }

    async fn ordered(&self, collection: &str, order: &OrderBy) -> Vec<RemoteDocument> {
        let mut documents = self
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();
        sort_documents(&mut documents, order);
        documents
    }

    fn open_session(&self, account: &Account) -> RemoteSession {
        let session = RemoteSession {
            uid: account.uid.clone(),
            email: account.email.clone(),
            display_name: account.display_name.clone(),
            expires_at: None,
        };
        self.sessions.send_replace(Some(session.clone()));
        session
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<RemoteSession, BackendError> {
        let key = email.trim().to_lowercase();
        let accounts = self.inner.accounts.read().await;
        let account = accounts
            .get(&key)
            .filter(|account| self.inner.verify(account, password))
            .ok_or(BackendError::InvalidCredentials)?;

        tracing::debug!("In-memory sign-in for {}", account.uid);
        Ok(self.inner.open_session(account))
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<RemoteSession, BackendError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(BackendError::Rejected(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let key = email.trim().to_lowercase();
        let mut accounts = self.inner.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(BackendError::EmailInUse);
        }

        let salt = Uuid::new_v4().simple().to_string();
        let digest = self.inner.digest(&salt, password)?;
        let account = Account {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.trim().to_string(),
            display_name: None,
            salt,
            digest,
        };
        let session = self.inner.open_session(&account);
        tracing::info!("Created in-memory account {}", account.uid);
        accounts.insert(key, account);

        Ok(session)
    }

    async fn update_display_name(&self, uid: &str, name: &str) -> Result<(), BackendError> {
        let mut accounts = self.inner.accounts.write().await;
        let account = accounts
            .values_mut()
            .find(|account| account.uid == uid)
            .ok_or_else(|| BackendError::NotFound(format!("account {}", uid)))?;
        account.display_name = Some(name.to_string());
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.inner.sessions.send_replace(None);
        Ok(())
    }

    fn sessions(&self) -> watch::Receiver<Option<RemoteSession>> {
        self.inner.sessions.subscribe()
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn add(&self, collection: &str, mut data: Value) -> Result<String, BackendError> {
        self.inner.take_failure()?;
        if !data.is_object() {
            return Err(BackendError::Rejected("document must be an object".to_string()));
        }
        resolve_server_timestamps(&mut data, self.inner.now());

        let id = Uuid::new_v4().simple().to_string();
        self.inner
            .collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(RemoteDocument {
                id: id.clone(),
                data,
            });
        self.inner.publish(collection, ChangeKind::Added, &id);

        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, mut data: Value) -> Result<(), BackendError> {
        self.inner.take_failure()?;
        if !data.is_object() {
            return Err(BackendError::Rejected("document must be an object".to_string()));
        }
        resolve_server_timestamps(&mut data, self.inner.now());

        let kind = {
            let mut collections = self.inner.collections.write().await;
            let documents = collections.entry(collection.to_string()).or_default();
            match documents.iter_mut().find(|d| d.id == id) {
                Some(existing) => {
                    existing.data = data;
                    ChangeKind::Modified
                }
                None => {
                    documents.push(RemoteDocument {
                        id: id.to_string(),
                        data,
                    });
                    ChangeKind::Added
                }
            }
        };
        self.inner.publish(collection, kind, id);

        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, mut patch: Value) -> Result<(), BackendError> {
        self.inner.take_failure()?;
        resolve_server_timestamps(&mut patch, self.inner.now());

        {
            let mut collections = self.inner.collections.write().await;
            let document = collections
                .get_mut(collection)
                .and_then(|documents| documents.iter_mut().find(|d| d.id == id))
                .ok_or_else(|| BackendError::NotFound(format!("{}/{}", collection, id)))?;
            merge_fields(&mut document.data, patch)?;
        }
        self.inner.publish(collection, ChangeKind::Modified, id);

        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RemoteDocument>, BackendError> {
        Ok(self
            .inner
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|documents| documents.iter().find(|d| d.id == id).cloned()))
    }

    async fn query(
        &self,
        collection: &str,
        order: &OrderBy,
    ) -> Result<Vec<RemoteDocument>, BackendError> {
        Ok(self.inner.ordered(collection, order).await)
    }

    async fn subscribe(
        &self,
        collection: &str,
        order: OrderBy,
    ) -> Result<SnapshotStream, BackendError> {
        // Subscribe before reading so no write slips between the two
        let receiver = self.inner.changes.subscribe();

        let documents = self.inner.ordered(collection, &order).await;
        let initial = CollectionSnapshot {
            changes: documents
                .iter()
                .map(|d| DocumentChange {
                    kind: ChangeKind::Added,
                    id: d.id.clone(),
                })
                .collect(),
            documents,
        };

        let inner = Arc::clone(&self.inner);
        let watched = collection.to_string();
        let updates = BroadcastStream::new(receiver)
            .filter_map({
                let watched = watched.clone();
                move |event| {
                    let watched = watched.clone();
                    async move {
                        match event {
                            Ok(event) if event.collection == watched => Some(vec![event.change]),
                            Ok(_) => None,
                            Err(lagged) => {
                                tracing::warn!("Change feed for {} lagged: {}", watched, lagged);
                                Some(Vec::new())
                            }
                        }
                    }
                }
            })
            .then(move |changes| {
                let inner = Arc::clone(&inner);
                let order = order.clone();
                let watched = watched.clone();
                async move {
                    Ok(CollectionSnapshot {
                        documents: inner.ordered(&watched, &order).await,
                        changes,
                    })
                }
            });

        Ok(futures::stream::once(async move { Ok(initial) })
            .chain(updates)
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::backend::server_timestamp;
    use serde_json::json;

    #[tokio::test]
    async fn test_account_lifecycle() {
        let backend = MemoryBackend::new();
        let sessions = backend.sessions();

        let created = backend
            .create_account("jane@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(sessions.borrow().as_ref().map(|s| s.uid.clone()), Some(created.uid.clone()));

        backend.sign_out().await.unwrap();
        assert!(sessions.borrow().is_none());

        let signed_in = backend
            .sign_in("Jane@Example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(signed_in.uid, created.uid);

        assert!(matches!(
            backend.sign_in("jane@example.com", "wrong-pass").await,
            Err(BackendError::InvalidCredentials)
        ));
        assert!(matches!(
            backend.create_account("jane@example.com", "another1").await,
            Err(BackendError::EmailInUse)
        ));
        assert!(matches!(
            backend.create_account("short@example.com", "abc").await,
            Err(BackendError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_server_timestamps_strictly_increase() {
        let backend = MemoryBackend::new();
        let id = backend
            .add("reports", json!({ "createdAt": server_timestamp() }))
            .await
            .unwrap();
        backend
            .update("reports", &id, json!({ "updatedAt": server_timestamp() }))
            .await
            .unwrap();

        let doc = backend.get("reports", &id).await.unwrap().unwrap();
        let created: crate::modules::backend::RemoteTimestamp =
            serde_json::from_value(doc.data["createdAt"].clone()).unwrap();
        let updated: crate::modules::backend::RemoteTimestamp =
            serde_json::from_value(doc.data["updatedAt"].clone()).unwrap();
        assert!(updated > created);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let backend = MemoryBackend::new();
        let result = backend
            .update("reports", "nope", json!({ "status": "resolved" }))
            .await;
        assert!(matches!(result, Err(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let backend = MemoryBackend::new();
        backend.fail_next_write(BackendError::Unavailable("offline".into()));

        assert!(backend.add("reports", json!({})).await.is_err());
        assert!(backend.add("reports", json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_emits_initial_then_changes() {
        let backend = MemoryBackend::new();
        backend.add("reports", json!({ "n": 1 })).await.unwrap();

        let mut stream = backend
            .subscribe("reports", OrderBy::desc("n"))
            .await
            .unwrap();

        let initial = stream.next().await.unwrap().unwrap();
        assert_eq!(initial.documents.len(), 1);

        backend.add("users", json!({ "n": 9 })).await.unwrap();
        let id = backend.add("reports", json!({ "n": 2 })).await.unwrap();

        let next = stream.next().await.unwrap().unwrap();
        assert_eq!(next.documents.len(), 2);
        assert_eq!(next.documents[0].id, id);
        assert_eq!(next.changes, vec![DocumentChange { kind: ChangeKind::Added, id }]);
    }
}
