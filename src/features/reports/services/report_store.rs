use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::StreamExt;
use tokio::sync::watch;
use uuid::Uuid;
use validator::Validate;

use crate::core::context::ErrorSlot;
use crate::core::error::{AppError, Result};
use crate::features::reports::dtos::ReportDraft;
use crate::features::reports::models::{
    decode_report, status_patch, Report, ReportFilter, ReportStatus,
};
use crate::features::session::models::User;
use crate::modules::backend::{
    BackendError, CollectionSnapshot, DocumentStore, OrderBy, SnapshotStream,
};
use crate::shared::constants::{CREATED_AT_FIELD, REPORTS_COLLECTION};

/// In-memory mirror of the `reports` collection.
///
/// Every mutation swaps in a whole new list, so readers holding a snapshot
/// never see a partial update. Entries are ordered newest first.
pub struct ReportStore {
    documents: Arc<dyn DocumentStore>,
    user: watch::Receiver<Option<User>>,
    mirror: watch::Sender<Arc<Vec<Report>>>,
    errors: Arc<ErrorSlot>,
}

enum Wake {
    UserChanged,
    UserClosed,
    Feed(Option<std::result::Result<CollectionSnapshot, BackendError>>),
}

async fn next_snapshot(
    feed: &mut Option<SnapshotStream>,
) -> Option<std::result::Result<CollectionSnapshot, BackendError>> {
    match feed {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl ReportStore {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        user: watch::Receiver<Option<User>>,
        errors: Arc<ErrorSlot>,
    ) -> Self {
        let (mirror, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            documents,
            user,
            mirror,
            errors,
        }
    }

    fn fail<T>(&self, error: AppError) -> Result<T> {
        self.errors.record(&error);
        Err(error)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn snapshot(&self) -> Arc<Vec<Report>> {
        Arc::clone(&self.mirror.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Report>>> {
        self.mirror.subscribe()
    }

    pub fn get(&self, id: &str) -> Option<Report> {
        self.mirror.borrow().iter().find(|r| r.id == id).cloned()
    }

    pub fn filter(&self, filter: &ReportFilter) -> Vec<Report> {
        self.mirror
            .borrow()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.mirror.send_if_modified(|current| {
            if current.is_empty() {
                return false;
            }
            *current = Arc::new(Vec::new());
            true
        });
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Submit a report as the signed-in user.
    ///
    /// The optimistic copy is in the mirror before the remote write settles
    /// and is dropped again if the write fails.
    pub async fn add_report(&self, draft: ReportDraft) -> Result<Report> {
        if let Err(e) = draft.validate() {
            return self.fail(e.into());
        }
        let Some(author) = self.user.borrow().clone() else {
            return self.fail(AppError::NotAuthenticated);
        };

        let client_ref = Uuid::new_v4();
        let new_report = draft.into_new_report(&author, client_ref);
        let local = new_report.optimistic(Utc::now());
        self.mirror
            .send_modify(|current| Arc::make_mut(current).insert(0, local.clone()));

        match self
            .documents
            .add(REPORTS_COLLECTION, new_report.to_document())
            .await
        {
            Ok(id) => {
                tracing::info!("Report {} submitted by {}", id, author.id);
                self.mirror.send_if_modified(|current| {
                    let Some(idx) = current
                        .iter()
                        .position(|r| r.is_pending() && r.client_ref == Some(client_ref))
                    else {
                        return false;
                    };
                    Arc::make_mut(current)[idx].id = id.clone();
                    true
                });
                Ok(Report { id, ..local })
            }
            Err(e) => {
                tracing::error!("Failed to submit report: {}", e);
                self.drop_pending(client_ref);
                self.fail(AppError::from_write_backend(e))
            }
        }
    }

    /// Write a new status; returns the updated mirror entry when the mirror
    /// holds one
    pub async fn update_report_status(
        &self,
        id: &str,
        status: ReportStatus,
    ) -> Result<Option<Report>> {
        if let Err(e) = self
            .documents
            .update(REPORTS_COLLECTION, id, status_patch(status))
            .await
        {
            tracing::error!("Failed to update status of report {}: {}", id, e);
            let error = match e {
                BackendError::NotFound(_) => {
                    AppError::NotFound(format!("Report {} not found", id))
                }
                other => AppError::from_write_backend(other),
            };
            return self.fail(error);
        }

        tracing::info!("Report {} set to {}", id, status);
        let mut updated = None;
        self.mirror.send_if_modified(|current| {
            let Some(idx) = current.iter().position(|r| r.id == id) else {
                return false;
            };
            let entry = &mut Arc::make_mut(current)[idx];
            entry.status = status;
            entry.updated_at = Utc::now().max(entry.updated_at + Duration::milliseconds(1));
            updated = Some(entry.clone());
            true
        });
        Ok(updated)
    }

    fn drop_pending(&self, client_ref: Uuid) {
        self.mirror.send_if_modified(|current| {
            let before = current.len();
            let kept: Vec<Report> = current
                .iter()
                .filter(|r| !(r.is_pending() && r.client_ref == Some(client_ref)))
                .cloned()
                .collect();
            if kept.len() == before {
                return false;
            }
            *current = Arc::new(kept);
            true
        });
    }

    // ========================================================================
    // Subscription
    // ========================================================================

    /// Replace the mirror with an authoritative snapshot, keeping only the
    /// optimistic entries the snapshot does not contain yet
    pub(crate) fn apply_snapshot(&self, snapshot: CollectionSnapshot) {
        if self.user.borrow().is_none() {
            tracing::debug!("Ignoring report snapshot while signed out");
            return;
        }
        for change in &snapshot.changes {
            tracing::debug!("Report {} {:?}", change.id, change.kind);
        }

        let mut decoded = Vec::with_capacity(snapshot.documents.len());
        for doc in &snapshot.documents {
            match decode_report(doc) {
                Ok(report) => decoded.push(report),
                Err(e) => {
                    tracing::warn!("Skipping malformed report: {}", e);
                    self.errors.record(&AppError::Decode(e));
                }
            }
        }
        let landed: HashSet<Uuid> = decoded.iter().filter_map(|r| r.client_ref).collect();

        self.mirror.send_modify(|current| {
            let next: Vec<Report> = current
                .iter()
                .filter(|r| r.is_pending() && !r.client_ref.is_some_and(|c| landed.contains(&c)))
                .cloned()
                .chain(decoded)
                .collect();
            *current = Arc::new(next);
        });
    }

    /// Standing subscription: follow the collection while someone is signed
    /// in, clear the mirror when nobody is. Every user change opens a fresh
    /// feed so the mirror starts again from a full snapshot. Runs until the
    /// user channel closes.
    pub async fn watch_collection(self: Arc<Self>) {
        let mut user = self.user.clone();
        let mut feed: Option<SnapshotStream> = None;
        let mut resubscribe = true;

        loop {
            if resubscribe {
                resubscribe = false;
                feed = None;
                let signed_in = user.borrow_and_update().is_some();
                if !signed_in {
                    self.clear();
                } else {
                    match self
                        .documents
                        .subscribe(REPORTS_COLLECTION, OrderBy::desc(CREATED_AT_FIELD))
                        .await
                    {
                        Ok(stream) => feed = Some(stream),
                        Err(e) => {
                            tracing::error!("Failed to subscribe to reports: {}", e);
                            self.errors.record(&AppError::Internal(format!(
                                "report subscription: {}",
                                e
                            )));
                        }
                    }
                }
            }

            let wake = tokio::select! {
                changed = user.changed() => match changed {
                    Ok(()) => Wake::UserChanged,
                    Err(_) => Wake::UserClosed,
                },
                item = next_snapshot(&mut feed) => Wake::Feed(item),
            };

            match wake {
                Wake::UserChanged => resubscribe = true,
                Wake::UserClosed => {
                    tracing::debug!("User channel closed");
                    break;
                }
                Wake::Feed(Some(Ok(snapshot))) => self.apply_snapshot(snapshot),
                Wake::Feed(Some(Err(e))) => {
                    tracing::error!("Report subscription error: {}", e);
                    self.errors
                        .record(&AppError::Internal(format!("report subscription: {}", e)));
                }
                Wake::Feed(None) => {
                    tracing::warn!("Report feed ended; resubscribing");
                    resubscribe = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reports::models::{ReportCategory, SyncState};
    use crate::features::session::models::UserRole;
    use crate::modules::backend::{MemoryBackend, RemoteDocument};
    use crate::shared::test_helpers::{draft, signed_in_context, SYNC_TIMEOUT};
    use serde_json::json;

    async fn wait_until<F>(store: &ReportStore, mut condition: F) -> Arc<Vec<Report>>
    where
        F: FnMut(&[Report]) -> bool,
    {
        let mut mirror = store.subscribe();
        let reports = tokio::time::timeout(
            SYNC_TIMEOUT,
            mirror.wait_for(|m| condition(m.as_slice())),
        )
        .await
        .expect("mirror did not reach the expected state")
        .unwrap();
        Arc::clone(&reports)
    }

    #[tokio::test]
    async fn test_add_requires_user() {
        let backend = MemoryBackend::new();
        let (user_tx, user_rx) = watch::channel(None);
        let store = ReportStore::new(
            Arc::new(backend.clone()),
            user_rx,
            Arc::new(ErrorSlot::default()),
        );

        let err = store.add_report(draft("Pothole")).await.unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated));
        assert!(store.snapshot().is_empty());
        assert!(backend
            .query(REPORTS_COLLECTION, &OrderBy::desc(CREATED_AT_FIELD))
            .await
            .unwrap()
            .is_empty());
        drop(user_tx);
    }

    #[tokio::test]
    async fn test_scenario_register_and_submit() {
        let (ctx, _backend, user) = signed_in_context("Jane", UserRole::Citizen).await;
        let store = ctx.reports();

        let mut d = draft("Pothole");
        d.status = Some(ReportStatus::Resolved);
        let submitted = store.add_report(d).await.unwrap();
        assert_eq!(submitted.status, ReportStatus::Pending);

        let reports = wait_until(store, |m| {
            m.len() == 1 && m[0].sync_state == SyncState::Synced
        })
        .await;
        let report = &reports[0];
        assert_eq!(report.id, submitted.id);
        assert_eq!(report.title, "Pothole");
        assert_eq!(report.category, ReportCategory::Infrastructure);
        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.citizen_id, user.id);
        assert_eq!(report.citizen_name, "Jane");
    }

    #[tokio::test]
    async fn test_reconciliation_leaves_one_copy() {
        let (ctx, _backend, _user) = signed_in_context("Jane", UserRole::Citizen).await;
        let store = ctx.reports();

        for title in ["First", "Second", "Third"] {
            store.add_report(draft(title)).await.unwrap();
        }

        let reports = wait_until(store, |m| m.iter().all(|r| !r.is_pending()) && m.len() == 3)
            .await;
        let titles: Vec<&str> = reports.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Third", "Second", "First"]);
    }

    #[tokio::test]
    async fn test_failed_write_drops_optimistic_entry() {
        let (ctx, backend, _user) = signed_in_context("Jane", UserRole::Citizen).await;
        let store = ctx.reports();

        backend.fail_next_write(BackendError::Unavailable("offline".to_string()));
        let err = store.add_report(draft("Pothole")).await.unwrap_err();

        assert!(matches!(err, AppError::RemoteWrite(_)));
        assert!(store.snapshot().is_empty());
        assert!(ctx
            .last_error()
            .is_some_and(|e| e.starts_with("Remote write failed")));
    }

    #[tokio::test]
    async fn test_apply_snapshot_keeps_unmatched_pending() {
        let (ctx, _backend, user) = signed_in_context("Jane", UserRole::Citizen).await;
        let store = ctx.reports();

        let landed_ref = Uuid::new_v4();
        let waiting_ref = Uuid::new_v4();
        for client_ref in [landed_ref, waiting_ref] {
            let local = draft("Local")
                .into_new_report(&user, client_ref)
                .optimistic(Utc::now());
            store
                .mirror
                .send_modify(|m| Arc::make_mut(m).insert(0, local));
        }

        let mut data = draft("Remote").into_new_report(&user, landed_ref).to_document();
        let stamp = json!({"seconds": 1_700_000_000, "nanos": 0});
        data["createdAt"] = stamp.clone();
        data["updatedAt"] = stamp;
        store.apply_snapshot(CollectionSnapshot {
            documents: vec![RemoteDocument {
                id: "r1".to_string(),
                data,
            }],
            changes: vec![],
        });

        let mirror = store.snapshot();
        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror[0].client_ref, Some(waiting_ref));
        assert!(mirror[0].is_pending());
        assert_eq!(mirror[1].id, "r1");
    }

    #[tokio::test]
    async fn test_malformed_document_is_skipped() {
        let (ctx, backend, _user) = signed_in_context("Jane", UserRole::Citizen).await;
        let store = ctx.reports();

        store.add_report(draft("Good")).await.unwrap();
        backend
            .insert_raw(REPORTS_COLLECTION, "bad", json!({"title": "No fields"}))
            .await;

        wait_until(store, |m| m.len() == 1 && !m[0].is_pending()).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.snapshot().len(), 1);
        assert!(ctx
            .last_error()
            .is_some_and(|e| e.starts_with("Malformed record: report bad")));
    }

    #[tokio::test]
    async fn test_status_update_bumps_updated_at() {
        let (ctx, _backend, _user) = signed_in_context("Jane", UserRole::Citizen).await;
        let store = ctx.reports();

        let id = store.add_report(draft("Pothole")).await.unwrap().id;
        let reports = wait_until(store, |m| m.iter().any(|r| r.id == id && !r.is_pending())).await;
        let before = reports[0].updated_at;

        let first = store
            .update_report_status(&id, ReportStatus::InProgress)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, ReportStatus::InProgress);
        assert!(first.updated_at > before);

        let prior = store.get(&id).unwrap().updated_at;
        let second = store
            .update_report_status(&id, ReportStatus::InProgress)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.status, ReportStatus::InProgress);
        assert!(second.updated_at > prior);
        assert_eq!(store.get(&id).unwrap().status, ReportStatus::InProgress);
    }

    #[tokio::test]
    async fn test_admin_resolves_pending_report() {
        let (ctx, backend, _citizen) = signed_in_context("Jane", UserRole::Citizen).await;
        let id = ctx.reports().add_report(draft("Pothole")).await.unwrap().id;

        ctx.logout().await.unwrap();
        let admin = crate::shared::test_helpers::registration("Ada", UserRole::Admin);
        let uid = ctx.register(&admin).await.unwrap();
        ctx.session().wait_for_user(&uid, SYNC_TIMEOUT).await.unwrap();

        let store = ctx.reports();
        wait_until(store, |m| {
            m.iter()
                .any(|r| r.id == id && r.status == ReportStatus::Pending)
        })
        .await;

        store
            .update_report_status(&id, ReportStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(store.get(&id).unwrap().status, ReportStatus::Resolved);

        let stored = backend.get(REPORTS_COLLECTION, &id).await.unwrap().unwrap();
        assert_eq!(stored.data["status"], "resolved");
    }

    #[tokio::test]
    async fn test_update_missing_report() {
        let (ctx, _backend, _user) = signed_in_context("Ada", UserRole::Admin).await;
        let err = ctx
            .reports()
            .update_report_status("missing", ReportStatus::Resolved)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(ctx.last_error().is_some());
    }

    #[tokio::test]
    async fn test_logout_clears_user_and_mirror() {
        let (ctx, _backend, _user) = signed_in_context("Jane", UserRole::Citizen).await;
        ctx.reports().add_report(draft("Pothole")).await.unwrap();
        wait_until(ctx.reports(), |m| !m.is_empty()).await;

        ctx.logout().await.unwrap();
        assert!(ctx.current_user().is_none());
        assert!(ctx.reports().snapshot().is_empty());

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(ctx.reports().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_filter() {
        let (ctx, _backend, user) = signed_in_context("Jane", UserRole::Citizen).await;
        let store = ctx.reports();
        let mut safety = draft("Broken light");
        safety.category = ReportCategory::Safety;
        store.add_report(safety).await.unwrap();
        store.add_report(draft("Pothole")).await.unwrap();
        wait_until(store, |m| m.len() == 2 && m.iter().all(|r| !r.is_pending())).await;

        let by_category = store.filter(&ReportFilter {
            category: Some(ReportCategory::Safety),
            ..Default::default()
        });
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].title, "Broken light");

        let mine = store.filter(&ReportFilter {
            citizen_id: Some(user.id.clone()),
            ..Default::default()
        });
        assert_eq!(mine.len(), 2);

        let resolved = store.filter(&ReportFilter {
            status: Some(ReportStatus::Resolved),
            ..Default::default()
        });
        assert!(resolved.is_empty());
    }
}
