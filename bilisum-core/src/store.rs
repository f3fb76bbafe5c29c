//! Analysis store: one insert, one ordered select
//!
//! `AnalysisStore` is the only way the rest of the service touches persisted
//! analyses. Records are immutable: there is no update or delete.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{Analysis, NewAnalysis};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Persist a record, returning it with `id` and `created_at` assigned.
    async fn create(&self, record: NewAnalysis) -> Result<Analysis, StoreError>;

    /// Records newest first. `Some(scope)` restricts to that session id.
    async fn list(&self, scope: Option<&str>) -> Result<Vec<Analysis>, StoreError>;

    /// Probe the backing store. Returns a short description of it.
    async fn health(&self) -> Result<String, StoreError>;
}

// ============================================================================
// PgAnalysisStore
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn create(&self, record: NewAnalysis) -> Result<Analysis, StoreError> {
        let analysis: Analysis = sqlx::query_as(
            r#"
            INSERT INTO analysis (url, title, summary, original_content, session_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, url, title, summary, original_content, session_id, created_at
            "#,
        )
        .bind(&record.url)
        .bind(&record.title)
        .bind(&record.summary)
        .bind(&record.original_content)
        .bind(&record.session_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(id = analysis.id, "Stored analysis");
        Ok(analysis)
    }

    async fn list(&self, scope: Option<&str>) -> Result<Vec<Analysis>, StoreError> {
        let rows: Vec<Analysis> = match scope {
            Some(session_id) => {
                sqlx::query_as(
                    r#"
                    SELECT id, url, title, summary, original_content, session_id, created_at
                    FROM analysis
                    WHERE session_id = $1
                    ORDER BY created_at DESC, id DESC
                    "#,
                )
                .bind(session_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, url, title, summary, original_content, session_id, created_at
                    FROM analysis
                    ORDER BY created_at DESC, id DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }
}

// ============================================================================
// MemoryAnalysisStore
// ============================================================================

/// In-process store with the same ordering and scoping rules as Postgres.
/// Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryAnalysisStore {
    records: RwLock<Vec<Analysis>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Creation time for a new record, never earlier than the previous one so a
/// wall-clock step backwards cannot reorder ids.
fn next_created_at(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn create(&self, record: NewAnalysis) -> Result<Analysis, StoreError> {
        let mut records = self.records.write().await;
        let id = records.last().map(|a| a.id + 1).unwrap_or(1);
        let created_at = next_created_at(records.last().map(|a| a.created_at), Utc::now());

        let analysis = Analysis {
            id,
            url: record.url,
            title: record.title,
            summary: record.summary,
            original_content: record.original_content,
            session_id: record.session_id,
            created_at,
        };
        records.push(analysis.clone());

        Ok(analysis)
    }

    async fn list(&self, scope: Option<&str>) -> Result<Vec<Analysis>, StoreError> {
        let records = self.records.read().await;
        let mut matching: Vec<Analysis> = records
            .iter()
            .filter(|a| match scope {
                Some(key) => a.session_id.as_deref() == Some(key),
                None => true,
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching)
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok("in-memory".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, session_id: Option<&str>) -> NewAnalysis {
        NewAnalysis {
            url: format!("https://www.bilibili.com/video/BV{}", title),
            title: title.to_string(),
            summary: format!("summary of {}", title),
            original_content: Some("transcript".to_string()),
            session_id: session_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_memory_list_empty_is_ok() {
        let store = MemoryAnalysisStore::new();
        assert!(store.list(None).await.unwrap().is_empty());
        assert!(store.list(Some("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_create_assigns_monotonic_ids() {
        let store = MemoryAnalysisStore::new();
        let first = store.create(record("a", None)).await.unwrap();
        let second = store.create(record("b", None)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(second.created_at >= first.created_at);
        assert_eq!(first.summary, "summary of a");
    }

    #[tokio::test]
    async fn test_memory_list_newest_first_and_roundtrips() {
        let store = MemoryAnalysisStore::new();
        let created = vec![
            store.create(record("a", None)).await.unwrap(),
            store.create(record("b", None)).await.unwrap(),
            store.create(record("c", None)).await.unwrap(),
        ];

        let listed = store.list(None).await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "b", "a"]);
        assert_eq!(listed[2], created[0]);
        assert_eq!(listed[0], created[2]);
    }

    #[tokio::test]
    async fn test_memory_list_filters_by_scope() {
        let store = MemoryAnalysisStore::new();
        store.create(record("mine", Some("s1"))).await.unwrap();
        store.create(record("theirs", Some("s2"))).await.unwrap();
        store.create(record("global", None)).await.unwrap();

        let mine = store.list(Some("s1")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "mine");

        assert_eq!(store.list(None).await.unwrap().len(), 3);
    }

    #[test]
    fn test_created_at_never_goes_backwards() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::seconds(30);

        assert_eq!(next_created_at(None, now), now);
        assert_eq!(next_created_at(Some(earlier), now), now);
        assert_eq!(next_created_at(Some(now), earlier), now);
    }
}
