//! Persistence backends for embedded chunks.
//!
//! A [`VectorStore`] holds the [`VectorRecord`]s of one collection. Writes
//! are keyed by source path: [`VectorStore::replace_sources`] atomically
//! drops every existing record of each source path present in the batch
//! before inserting the new ones, so re-ingesting a file never duplicates
//! or leaves a stale tail of its chunks.
//!
//! Similarity is cosine over the full collection; both backends share
//! [`rank`] for it.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::models::{RetrievalResult, ScoredChunk, VectorRecord};

/// Counts reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub record_count: u64,
    pub source_count: u64,
    pub last_ingested_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace all records of every source path in `records` with `records`,
    /// in one atomic write. Returns the number of records written.
    async fn replace_sources(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// Drop every record of one source path. Returns how many were removed.
    async fn remove_source(&self, source_path: &str) -> Result<u64>;

    /// Remove every record of the collection. Returns how many were removed.
    async fn clear(&self) -> Result<u64>;

    /// Up to `k` records closest to `query`, best first.
    async fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Human-readable location (`sqlite:/path`, `memory`).
    fn location(&self) -> String;
}

/// Score every record against `query` and keep the best `k`.
///
/// Ties keep their input order, so results are stable for a given store.
pub fn rank<'a, I>(records: I, query: &[f32], k: usize) -> RetrievalResult
where
    I: IntoIterator<Item = &'a VectorRecord>,
{
    let mut scored: Vec<ScoredChunk> = records
        .into_iter()
        .map(|record| ScoredChunk {
            chunk: record.chunk.clone(),
            score: cosine_similarity(query, &record.embedding),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}


#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    #[test]
    fn test_rank_orders_and_truncates() {
        let records = vec![
            record("a.md", 0, "far", vec![0.0, 1.0]),
            record("b.md", 0, "near", vec![1.0, 0.0]),
            record("c.md", 0, "middle", vec![1.0, 1.0]),
        ];
        let ranked = rank(&records, &[1.0, 0.0], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.text, "near");
        assert_eq!(ranked[1].chunk.text, "middle");
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn test_rank_empty() {
        let records: Vec<VectorRecord> = Vec::new();
        assert!(rank(&records, &[1.0], 5).is_empty());
    }
}
