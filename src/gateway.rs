//! Vector store gateway: the only way chunks get in and results get out.
//!
//! Couples an [`Embedder`] with a [`VectorStore`]. `upsert` embeds chunk
//! text in batches of `embedding.batch_size`, checks every vector's width
//! against the embedder, and hands the records to the store in one write.
//! `search` embeds the query and returns the `k` nearest chunks.
//!
//! Record ids are UUID v5 of `collection/source_path#chunk_index`, so the
//! same chunk position of the same file always maps to the same id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};
use crate::models::{Chunk, RetrievalResult, VectorRecord};
use crate::store::{SqliteStore, VectorStore};

/// Read-only snapshot of the index.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub record_count: u64,
    pub source_count: u64,
    pub collection: String,
    pub embedding_model: String,
    pub dims: usize,
    pub location: String,
    pub last_ingested_at: Option<DateTime<Utc>>,
}

pub struct VectorStoreGateway {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    batch_size: usize,
    default_k: i64,
}

impl VectorStoreGateway {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        batch_size: usize,
        default_k: i64,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
            batch_size: batch_size.max(1),
            default_k,
        }
    }

    /// Gateway over the configured embedder and the SQLite index under
    /// `paths.vector_store`.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        std::fs::create_dir_all(&config.paths.vector_store).map_err(|e| {
            RagError::store_write(format!(
                "cannot create {}: {}",
                config.paths.vector_store.display(),
                e
            ))
        })?;
        let store = SqliteStore::open(&config.index_path(), &config.store.collection).await?;

        Ok(Self::new(
            embedder,
            Arc::new(store),
            config.store.collection.clone(),
            config.embedding.batch_size,
            config.retrieval.top_k,
        ))
    }

    pub fn record_id(collection: &str, source_path: &str, chunk_index: i64) -> String {
        let name = format!("{}/{}#{}", collection, source_path, chunk_index);
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn default_k(&self) -> i64 {
        self.default_k
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Embed and persist `chunks`, returning how many records were written.
    ///
    /// All chunks of a given source path must arrive in the same call: the
    /// store replaces a source's previous records wholesale.
    pub async fn upsert(&self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let dims = self.embedder.dims();
        let model = self.embedder.model_name().to_string();
        let mut records = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for (chunk, embedding) in batch.iter().zip(vectors) {
                if embedding.len() != dims {
                    return Err(RagError::embedding(format!(
                        "dimension mismatch: model {} declares {} but returned {}",
                        model,
                        dims,
                        embedding.len()
                    )));
                }
                records.push(VectorRecord {
                    id: Self::record_id(
                        &self.collection,
                        &chunk.metadata.source_path,
                        chunk.metadata.chunk_index,
                    ),
                    chunk: chunk.clone(),
                    embedding,
                    model: model.clone(),
                });
            }
            debug!(batch = batch.len(), "embedded batch");
        }

        self.store.replace_sources(records).await
    }

    /// Up to `k` chunks most similar to `query`, best first.
    pub async fn search(&self, query: &str, k: i64) -> Result<RetrievalResult> {
        if k <= 0 {
            return Err(RagError::invalid_argument(format!(
                "k must be positive, got {}",
                k
            )));
        }
        if self.store.stats().await?.record_count == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_query(query).await.map_err(|e| match e {
            RagError::Embedding(msg) => RagError::retrieval(format!("query embedding failed: {}", msg)),
            other => other,
        })?;
        self.store.search(&vector, k as usize).await
    }

    /// Drop whatever the index holds for `source_path`.
    pub async fn remove_source(&self, source_path: &str) -> Result<u64> {
        self.store.remove_source(source_path).await
    }

    /// Remove every record of the collection.
    pub async fn clear(&self) -> Result<u64> {
        self.store.clear().await
    }

    pub async fn stats(&self) -> Result<GatewayStats> {
        let stats = self.store.stats().await?;
        Ok(GatewayStats {
            record_count: stats.record_count,
            source_count: stats.source_count,
            collection: self.collection.clone(),
            embedding_model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
            location: self.store.location(),
            last_ingested_at: stats.last_ingested_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::models::{Category, ChunkMetadata};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn gateway_with(embedder: Arc<dyn Embedder>) -> VectorStoreGateway {
        VectorStoreGateway::new(embedder, Arc::new(MemoryStore::new()), "code_docs", 2, 5)
    }

    fn gateway() -> VectorStoreGateway {
        gateway_with(Arc::new(HashingEmbedder::new(128)))
    }

    fn chunk(source: &str, index: i64, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source_path: source.to_string(),
                category: Category::Documentation,
                file_type: "md".to_string(),
                chunk_index: index,
            },
            hash: String::new(),
        }
    }

    struct WrongWidth;

    #[async_trait]
    impl Embedder for WrongWidth {
        fn model_name(&self) -> &str {
            "wrong"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
        }
    }

    #[test]
    fn test_record_id_is_deterministic() {
        let a = VectorStoreGateway::record_id("code_docs", "src/a.ts", 0);
        let b = VectorStoreGateway::record_id("code_docs", "src/a.ts", 0);
        let c = VectorStoreGateway::record_id("code_docs", "src/a.ts", 1);
        let d = VectorStoreGateway::record_id("other", "src/a.ts", 0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[tokio::test]
    async fn test_upsert_batches_and_counts() {
        let gw = gateway();
        let written = gw
            .upsert(vec![
                chunk("a.md", 0, "alpha"),
                chunk("a.md", 1, "beta"),
                chunk("a.md", 2, "gamma"),
            ])
            .await
            .unwrap();
        assert_eq!(written, 3);
        let stats = gw.stats().await.unwrap();
        assert_eq!(stats.record_count, 3);
        assert_eq!(stats.source_count, 1);
        assert_eq!(stats.dims, 128);
        assert_eq!(stats.collection, "code_docs");
        assert_eq!(stats.location, "memory");
    }

    #[tokio::test]
    async fn test_search_rejects_non_positive_k() {
        let gw = gateway();
        for k in [0, -3] {
            assert!(matches!(
                gw.search("anything", k).await.unwrap_err(),
                RagError::InvalidArgument(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        assert!(gateway().search("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_bounded_and_sorted() {
        let gw = gateway();
        let chunks = (0..7)
            .map(|i| chunk(&format!("doc{}.md", i), 0, &format!("topic {} email login", i)))
            .collect();
        gw.upsert(chunks).await.unwrap();

        let results = gw.search("email login", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_embedding_error() {
        let gw = gateway_with(Arc::new(WrongWidth));
        let err = gw.upsert(vec![chunk("a.md", 0, "x")]).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert_eq!(gw.stats().await.unwrap().record_count, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let gw = gateway();
        gw.upsert(vec![chunk("a.md", 0, "x")]).await.unwrap();
        assert_eq!(gw.clear().await.unwrap(), 1);
        assert_eq!(gw.stats().await.unwrap().record_count, 0);
    }
}
