use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::RwLock;

use super::{rank, StoreStats, VectorStore};
use crate::error::Result;
use crate::models::{RetrievalResult, VectorRecord};

/// Process-local store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    records: Vec<VectorRecord>,
    last_ingested_at: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn replace_sources(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let sources: HashSet<String> = records
            .iter()
            .map(|r| r.chunk.metadata.source_path.clone())
            .collect();
        let written = records.len();

        let mut inner = self.inner.write().await;
        inner
            .records
            .retain(|r| !sources.contains(&r.chunk.metadata.source_path));
        inner.records.extend(records);
        if written > 0 {
            inner.last_ingested_at = Some(Utc::now());
        }
        Ok(written)
    }

    async fn remove_source(&self, source_path: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner
            .records
            .retain(|r| r.chunk.metadata.source_path != source_path);
        Ok((before - inner.records.len()) as u64)
    }

    async fn clear(&self) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let removed = inner.records.len() as u64;
        inner.records.clear();
        inner.last_ingested_at = None;
        Ok(removed)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        let inner = self.inner.read().await;
        Ok(rank(&inner.records, query, k))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read().await;
        let sources: HashSet<&str> = inner
            .records
            .iter()
            .map(|r| r.chunk.metadata.source_path.as_str())
            .collect();
        Ok(StoreStats {
            record_count: inner.records.len() as u64,
            source_count: sources.len() as u64,
            last_ingested_at: inner.last_ingested_at,
        })
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::record;

    #[tokio::test]
    async fn test_replace_drops_stale_tail() {
        let store = MemoryStore::new();
        store
            .replace_sources(vec![
                record("a.md", 0, "one", vec![1.0]),
                record("a.md", 1, "two", vec![1.0]),
                record("b.md", 0, "other", vec![1.0]),
            ])
            .await
            .unwrap();
        store
            .replace_sources(vec![record("a.md", 0, "one again", vec![1.0])])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.source_count, 2);
        assert!(stats.last_ingested_at.is_some());
    }

    #[tokio::test]
    async fn test_clear_and_empty_search() {
        let store = MemoryStore::new();
        store
            .replace_sources(vec![record("a.md", 0, "one", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.search(&[1.0], 5).await.unwrap().is_empty());
        assert!(store.stats().await.unwrap().last_ingested_at.is_none());
    }

    #[tokio::test]
    async fn test_remove_source() {
        let store = MemoryStore::new();
        store
            .replace_sources(vec![
                record("a.md", 0, "a0", vec![1.0]),
                record("a.md", 1, "a1", vec![1.0]),
                record("b.md", 0, "b0", vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.remove_source("a.md").await.unwrap(), 2);
        assert_eq!(store.remove_source("missing.md").await.unwrap(), 0);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.source_count, 1);
    }
}
