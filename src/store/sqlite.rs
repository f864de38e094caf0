use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{rank, StoreStats, VectorStore};
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{Category, Chunk, ChunkMetadata, RetrievalResult, VectorRecord};

/// One collection inside a SQLite index file.
pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    path: PathBuf,
}

impl SqliteStore {
    /// Open or create the index at `path` and ensure the schema exists.
    pub async fn open(path: &Path, collection: &str) -> Result<Self> {
        let pool = db::connect(path).await.map_err(|e| {
            RagError::store_write(format!("cannot open {}: {}", path.display(), e))
        })?;
        migrate::run_migrations(&pool)
            .await
            .map_err(|e| RagError::store_write(format!("migration failed: {}", e)))?;

        Ok(Self {
            pool,
            collection: collection.to_string(),
            path: path.to_path_buf(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn load_records(&self) -> std::result::Result<Vec<VectorRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_path, category, file_type, chunk_index, text,
                   content_hash, embedding, model
            FROM records
            WHERE collection = ?
            ORDER BY source_path, chunk_index
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &SqliteRow) -> std::result::Result<VectorRecord, sqlx::Error> {
    let category: String = row.try_get("category")?;
    let blob: Vec<u8> = row.try_get("embedding")?;

    Ok(VectorRecord {
        id: row.try_get("id")?,
        chunk: Chunk {
            text: row.try_get("text")?,
            metadata: ChunkMetadata {
                source_path: row.try_get("source_path")?,
                category: Category::parse(&category).unwrap_or(Category::Documentation),
                file_type: row.try_get("file_type")?,
                chunk_index: row.try_get("chunk_index")?,
            },
            hash: row.try_get("content_hash")?,
        },
        embedding: blob_to_vec(&blob),
        model: row.try_get("model")?,
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn replace_sources(&self, records: Vec<VectorRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let sources: BTreeSet<&str> = records
            .iter()
            .map(|r| r.chunk.metadata.source_path.as_str())
            .collect();
        let now = Utc::now().timestamp();
        let write_err = |e: sqlx::Error| RagError::store_write(e.to_string());

        let mut tx = self.pool.begin().await.map_err(write_err)?;

        for source in &sources {
            sqlx::query("DELETE FROM records WHERE collection = ? AND source_path = ?")
                .bind(&self.collection)
                .bind(*source)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
        }

        for record in &records {
            let meta = &record.chunk.metadata;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO records
                    (id, collection, source_path, category, file_type, chunk_index,
                     text, content_hash, embedding, model, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&self.collection)
            .bind(&meta.source_path)
            .bind(meta.category.as_str())
            .bind(&meta.file_type)
            .bind(meta.chunk_index)
            .bind(&record.chunk.text)
            .bind(&record.chunk.hash)
            .bind(vec_to_blob(&record.embedding))
            .bind(&record.model)
            .bind(record.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
        debug!(
            sources = sources.len(),
            records = records.len(),
            "replaced source records"
        );
        Ok(records.len())
    }

    async fn remove_source(&self, source_path: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND source_path = ?")
            .bind(&self.collection)
            .bind(source_path)
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::store_write(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::store_write(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        let records = self
            .load_records()
            .await
            .map_err(|e| RagError::retrieval(e.to_string()))?;
        Ok(rank(&records, query, k))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS record_count,
                   COUNT(DISTINCT source_path) AS source_count,
                   MAX(created_at) AS last_ingested_at
            FROM records
            WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RagError::retrieval(e.to_string()))?;

        let read = |e: sqlx::Error| RagError::retrieval(e.to_string());
        let record_count: i64 = row.try_get("record_count").map_err(read)?;
        let source_count: i64 = row.try_get("source_count").map_err(read)?;
        let last: Option<i64> = row.try_get("last_ingested_at").map_err(read)?;

        Ok(StoreStats {
            record_count: record_count as u64,
            source_count: source_count as u64,
            last_ingested_at: last.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        })
    }

    fn location(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::record;
    use tempfile::TempDir;

    async fn open(tmp: &TempDir, collection: &str) -> SqliteStore {
        SqliteStore::open(&tmp.path().join("index.sqlite"), collection)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip_and_search() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "code_docs").await;
        store
            .replace_sources(vec![
                record("a.md", 0, "near", vec![1.0, 0.0]),
                record("b.md", 0, "far", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.1], 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "near");
        assert_eq!(results[0].chunk.metadata.source_path, "a.md");
        assert_eq!(results[0].chunk.hash, "hash-near");
    }

    #[tokio::test]
    async fn test_replace_is_per_source() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "code_docs").await;
        store
            .replace_sources(vec![
                record("a.md", 0, "a0", vec![1.0]),
                record("a.md", 1, "a1", vec![1.0]),
                record("b.md", 0, "b0", vec![1.0]),
            ])
            .await
            .unwrap();
        store
            .replace_sources(vec![record("a.md", 0, "a0 new", vec![1.0])])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.source_count, 2);
        assert!(stats.last_ingested_at.is_some());
    }

    #[tokio::test]
    async fn test_remove_source_leaves_others() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "code_docs").await;
        store
            .replace_sources(vec![
                record("a.md", 0, "a0", vec![1.0]),
                record("b.md", 0, "b0", vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.remove_source("a.md").await.unwrap(), 1);
        let results = store.search(&[1.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.metadata.source_path, "b.md");
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let docs = open(&tmp, "docs").await;
        let other = open(&tmp, "other").await;
        docs.replace_sources(vec![record("a.md", 0, "a", vec![1.0])])
            .await
            .unwrap();

        assert_eq!(other.stats().await.unwrap().record_count, 0);
        assert_eq!(other.clear().await.unwrap(), 0);
        assert_eq!(docs.stats().await.unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open(&tmp, "code_docs").await;
            store
                .replace_sources(vec![record("a.md", 0, "kept", vec![0.5, 0.5])])
                .await
                .unwrap();
            store.close().await;
        }
        let store = open(&tmp, "code_docs").await;
        let results = store.search(&[0.5, 0.5], 1).await.unwrap();
        assert_eq!(results[0].chunk.text, "kept");
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, "code_docs").await;
        assert!(store.search(&[1.0], 5).await.unwrap().is_empty());
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.record_count, 0);
        assert!(stats.last_ingested_at.is_none());
    }
}
