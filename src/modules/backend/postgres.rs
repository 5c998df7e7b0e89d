use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{postgres::PgListener, types::Json, PgPool};
use uuid::Uuid;

use super::{
    resolve_server_timestamps, sort_documents, BackendError, ChangeKind,
    CollectionSnapshot, DocumentChange, DocumentStore, OrderBy, RemoteDocument, SnapshotStream,
};

/// Channel the `documents` trigger notifies on (see migrations)
const CHANGE_CHANNEL: &str = "documents_changed";

/// Payload emitted by the `notify_document_change` trigger
#[derive(Debug, Deserialize)]
struct ChangeNotification {
    collection: String,
    id: String,
    op: String,
}

impl ChangeNotification {
    fn kind(&self) -> ChangeKind {
        match self.op.as_str() {
            "INSERT" => ChangeKind::Added,
            "DELETE" => ChangeKind::Removed,
            _ => ChangeKind::Modified,
        }
    }
}

fn unavailable(e: sqlx::Error) -> BackendError {
    tracing::error!("Document store query failed: {:?}", e);
    BackendError::Unavailable(e.to_string())
}

/// Document store over a single JSONB table.
///
/// Change notification uses `LISTEN documents_changed`; each notification for
/// the watched collection triggers a full ordered re-read.
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(pool: &PgPool, collection: &str, order: &OrderBy) -> Result<Vec<RemoteDocument>, BackendError> {
        let rows: Vec<(String, Json<Value>)> = sqlx::query_as(
            r#"
            SELECT id, data
            FROM documents
            WHERE collection = $1
            "#,
        )
        .bind(collection)
        .fetch_all(pool)
        .await
        .map_err(unavailable)?;

        let mut documents: Vec<RemoteDocument> = rows
            .into_iter()
            .map(|(id, Json(data))| RemoteDocument { id, data })
            .collect();
        sort_documents(&mut documents, order);
        Ok(documents)
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn add(&self, collection: &str, mut data: Value) -> Result<String, BackendError> {
        if !data.is_object() {
            return Err(BackendError::Rejected("document must be an object".to_string()));
        }
        resolve_server_timestamps(&mut data, Utc::now());
        let id = Uuid::new_v4().simple().to_string();

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(Json(&data))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        tracing::debug!("Inserted document {}/{}", collection, id);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, mut data: Value) -> Result<(), BackendError> {
        if !data.is_object() {
            return Err(BackendError::Rejected("document must be an object".to_string()));
        }
        resolve_server_timestamps(&mut data, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id)
            DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&data))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, mut patch: Value) -> Result<(), BackendError> {
        if !patch.is_object() {
            return Err(BackendError::Rejected(
                "update payload must be an object".to_string(),
            ));
        }
        resolve_server_timestamps(&mut patch, Utc::now());

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET data = data || $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&patch))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(BackendError::NotFound(format!("{}/{}", collection, id)));
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RemoteDocument>, BackendError> {
        let row: Option<(String, Json<Value>)> = sqlx::query_as(
            r#"
            SELECT id, data
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(row.map(|(id, Json(data))| RemoteDocument { id, data }))
    }

    async fn query(
        &self,
        collection: &str,
        order: &OrderBy,
    ) -> Result<Vec<RemoteDocument>, BackendError> {
        Self::load(&self.pool, collection, order).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        order: OrderBy,
    ) -> Result<SnapshotStream, BackendError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(unavailable)?;
        listener.listen(CHANGE_CHANNEL).await.map_err(unavailable)?;
        tracing::info!("Listening on {} for collection {}", CHANGE_CHANNEL, collection);

        let documents = Self::load(&self.pool, collection, &order).await?;
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

        let pool = self.pool.clone();
        let watched = collection.to_string();
        let updates = listener
            .into_stream()
            .filter_map({
                let watched = watched.clone();
                move |notification| {
                    let watched = watched.clone();
                    async move {
                        match notification {
                            Ok(notification) => {
                                match serde_json::from_str::<ChangeNotification>(
                                    notification.payload(),
                                ) {
                                    Ok(change) if change.collection == watched => {
                                        Some(Ok(vec![DocumentChange {
                                            kind: change.kind(),
                                            id: change.id,
                                        }]))
                                    }
                                    Ok(_) => None,
                                    Err(e) => {
                                        tracing::warn!("Ignoring malformed change notification: {}", e);
                                        None
                                    }
                                }
                            }
                            Err(e) => Some(Err(unavailable(e))),
                        }
                    }
                }
            })
            .then(move |changes| {
                let pool = pool.clone();
                let order = order.clone();
                let watched = watched.clone();
                async move {
                    let changes = changes?;
                    Ok(CollectionSnapshot {
                        documents: Self::load(&pool, &watched, &order).await?,
                        changes,
                    })
                }
            });

        Ok(futures::stream::once(async move { Ok(initial) })
            .chain(updates)
            .boxed())
    }
}
