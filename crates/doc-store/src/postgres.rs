use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::store::document_id;
use crate::{
    DocumentStore, DocumentStream, Filter, FindOptions, Result, SortOrder, StoreError, Update,
};

const STREAM_BUFFER: usize = 64;

/// PostgreSQL-backed document store.
///
/// All collections share the `documents` table. Equality conditions are
/// pushed down as a JSONB containment pre-filter; the remaining conditions
/// are evaluated on the fetched rows.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Locks and returns the first matching row inside `tx`.
    async fn lock_first_match(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<(String, Value)>> {
        let rows = sqlx::query(
            r#"
            SELECT id, body FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY created_at ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(collection)
        .bind(filter.containment_document())
        .fetch_all(&mut **tx)
        .await?;

        for row in rows {
            let body: Value = row.try_get("body")?;
            if filter.matches(&body) {
                return Ok(Some((row.try_get("id")?, body)));
            }
        }
        Ok(None)
    }

    async fn matching_bodies(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(collection)
        .bind(filter.containment_document())
        .fetch_all(&self.pool)
        .await?;

        let mut bodies = Vec::new();
        for row in rows {
            let body: Value = row.try_get("body")?;
            if filter.matches(&body) {
                bodies.push(body);
            }
        }
        Ok(bodies)
    }
}

/// Builds the `find` query. Sorting happens in PostgreSQL on the JSONB
/// value at the sort path (bound as `$3`), so rows arrive already ordered
/// and can be forwarded one at a time. Missing fields sort first, like JSON
/// `null` in the in-memory store.
fn find_sql(options: &FindOptions) -> String {
    let order_by = match &options.sort {
        None => "created_at ASC, id ASC",
        Some((_, SortOrder::Ascending)) => "body #> $3 ASC NULLS FIRST, created_at ASC, id ASC",
        Some((_, SortOrder::Descending)) => "body #> $3 DESC NULLS LAST, created_at ASC, id ASC",
    };
    format!(
        "SELECT body FROM documents WHERE collection = $1 AND body @> $2 ORDER BY {order_by}"
    )
}

/// Splits a dotted field path into the `text[]` form `#>` expects.
fn json_path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn insert(&self, collection: &str, document: Value) -> Result<()> {
        let id = document_id(collection, &document)?;

        sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(&document)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return StoreError::AlreadyExists {
                        collection: collection.to_string(),
                        id: id.clone(),
                    };
                }
                StoreError::Database(e)
            })?;

        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        Ok(self
            .matching_bodies(collection, filter)
            .await?
            .into_iter()
            .next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Filter,
        options: FindOptions,
    ) -> Result<DocumentStream> {
        use futures_util::TryStreamExt;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let pool = self.pool.clone();
        let collection = collection.to_string();

        tokio::spawn(async move {
            let containment = filter.containment_document();
            let sql = find_sql(&options);
            let mut query = sqlx::query(&sql).bind(&collection).bind(containment);
            if let Some((field, _)) = &options.sort {
                query = query.bind(json_path(field));
            }
            let mut rows = query.fetch(&pool);
            let mut sent = 0usize;

            while options.limit.is_none_or(|limit| sent < limit) {
                let row = match rows.try_next().await {
                    Ok(Some(row)) => row,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(StoreError::Database(e))).await;
                        return;
                    }
                };
                let body: Value = match row.try_get("body") {
                    Ok(body) => body,
                    Err(e) => {
                        let _ = tx.send(Err(StoreError::Database(e))).await;
                        return;
                    }
                };
                if !filter.matches(&body) {
                    continue;
                }
                if tx.send(Ok(body)).await.is_err() {
                    // Receiver dropped; stop reading.
                    return;
                }
                sent += 1;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Value>> {
        let mut tx = self.pool.begin().await?;

        let Some((id, mut body)) = Self::lock_first_match(&mut tx, collection, filter).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        update.apply(&mut body)?;

        sqlx::query(
            "UPDATE documents SET body = $3, updated_at = NOW() WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(&id)
        .bind(&body)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::trace!(collection, %id, "document updated");
        Ok(Some(body))
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let Some((id, _)) = Self::lock_first_match(&mut tx, collection, filter).await? else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self.matching_bodies(collection, filter).await?.len() as u64)
    }
}
