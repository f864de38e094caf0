//! Ingestion pipeline orchestration.
//!
//! Loader → Splitter → Gateway, one document at a time. Unreadable files
//! and documents whose embedding fails become warnings in the
//! [`IngestReport`]; store failures and a missing root abort the run.
//!
//! With `force_reindex` the collection is cleared before the first write,
//! so a forced rebuild never leaves stale records behind. Without it each
//! document replaces its own previous records (see [`crate::store`]), so
//! re-ingesting unchanged content keeps the record count stable.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::chunk::Splitter;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::gateway::VectorStoreGateway;
use crate::loader::Loader;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub root: String,
    /// Documents that produced at least one stored chunk (or, in a dry run,
    /// at least one chunk).
    pub documents_processed: usize,
    pub chunks_created: usize,
    /// One line per skipped file or failed document.
    pub warnings: Vec<String>,
    pub duration_ms: u64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    DryRun,
}

/// Caller-facing projection of an [`IngestReport`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub status: IngestStatus,
    pub documents_processed: usize,
    pub chunks_created: usize,
    pub message: String,
    pub warnings: Vec<String>,
}

impl From<IngestReport> for IngestResult {
    fn from(report: IngestReport) -> Self {
        let mut message = if report.documents_processed == 0 {
            format!("No documents found under {}", report.root)
        } else if report.dry_run {
            format!(
                "Would ingest {} documents as {} chunks",
                report.documents_processed, report.chunks_created
            )
        } else {
            format!(
                "Ingested {} documents as {} chunks",
                report.documents_processed, report.chunks_created
            )
        };
        if !report.warnings.is_empty() {
            message.push_str(&format!(" ({} skipped)", report.warnings.len()));
        }

        IngestResult {
            status: if report.dry_run {
                IngestStatus::DryRun
            } else {
                IngestStatus::Success
            },
            documents_processed: report.documents_processed,
            chunks_created: report.chunks_created,
            message,
            warnings: report.warnings,
        }
    }
}

pub struct IngestionPipeline {
    loader: Loader,
    splitter: Splitter,
    gateway: Arc<VectorStoreGateway>,
}

impl IngestionPipeline {
    pub fn new(loader: Loader, splitter: Splitter, gateway: Arc<VectorStoreGateway>) -> Self {
        Self {
            loader,
            splitter,
            gateway,
        }
    }

    pub fn from_config(config: &Config, gateway: Arc<VectorStoreGateway>) -> Result<Self> {
        Ok(Self::new(
            Loader::new(&config.loader)?,
            Splitter::from_config(&config.chunking),
            gateway,
        ))
    }

    /// Index everything under `root`.
    pub async fn ingest(&self, root: &Path, force_reindex: bool) -> Result<IngestReport> {
        self.run(root, force_reindex, false).await
    }

    /// Load and split without touching the store.
    pub async fn dry_run(&self, root: &Path) -> Result<IngestReport> {
        self.run(root, false, true).await
    }

    async fn run(&self, root: &Path, force_reindex: bool, dry_run: bool) -> Result<IngestReport> {
        let started = Instant::now();
        // Validates the root before anything is cleared.
        let documents = self.loader.load(root)?;

        let mut report = IngestReport {
            root: root.display().to_string(),
            dry_run,
            ..Default::default()
        };

        if force_reindex && !dry_run {
            let removed = self.gateway.clear().await?;
            info!(removed, "cleared collection for full reindex");
        }

        let mut embedding_failures = 0usize;
        let mut last_embedding_error = None;

        for item in documents {
            let doc = match item {
                Ok(doc) => doc,
                Err(failure) => {
                    report.warnings.push(format!("skipped {}", failure));
                    continue;
                }
            };

            let chunks = self.splitter.split(&doc);
            if chunks.is_empty() {
                debug!(path = %doc.source_path, "empty document, nothing to index");
                // An emptied file must not keep serving its old chunks.
                if !dry_run && !force_reindex {
                    let removed = self.gateway.remove_source(&doc.source_path).await?;
                    if removed > 0 {
                        info!(path = %doc.source_path, removed, "dropped records of emptied file");
                    }
                }
                continue;
            }
            let chunk_count = chunks.len();

            if dry_run {
                report.documents_processed += 1;
                report.chunks_created += chunk_count;
                continue;
            }

            match self.gateway.upsert(chunks).await {
                Ok(written) => {
                    debug!(path = %doc.source_path, chunks = written, "indexed");
                    report.documents_processed += 1;
                    report.chunks_created += written;
                }
                Err(RagError::Embedding(msg)) => {
                    warn!(path = %doc.source_path, error = %msg, "embedding failed, document skipped");
                    report
                        .warnings
                        .push(format!("{}: embedding failed: {}", doc.source_path, msg));
                    embedding_failures += 1;
                    last_embedding_error = Some(msg);
                }
                Err(e) => return Err(e),
            }
        }

        // Every document failing to embed means the backend itself is down.
        if report.documents_processed == 0 && embedding_failures > 0 {
            if let Some(msg) = last_embedding_error {
                return Err(RagError::Embedding(msg));
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            root = %report.root,
            documents = report.documents_processed,
            chunks = report.chunks_created,
            warnings = report.warnings.len(),
            dry_run,
            "ingestion finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::embedding::{Embedder, HashingEmbedder};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    fn pipeline_with(embedder: Arc<dyn Embedder>) -> (IngestionPipeline, Arc<VectorStoreGateway>) {
        let gateway = Arc::new(VectorStoreGateway::new(
            embedder,
            Arc::new(MemoryStore::new()),
            "code_docs",
            16,
            5,
        ));
        let pipeline = IngestionPipeline::new(
            Loader::new(&LoaderConfig::default()).unwrap(),
            Splitter::new(200, 40),
            Arc::clone(&gateway),
        );
        (pipeline, gateway)
    }

    fn pipeline() -> (IngestionPipeline, Arc<VectorStoreGateway>) {
        pipeline_with(Arc::new(HashingEmbedder::new(64)))
    }

    /// Fails on any text containing "poison".
    struct Picky;

    #[async_trait]
    impl Embedder for Picky {
        fn model_name(&self) -> &str {
            "picky"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(RagError::embedding("refused"));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_missing_root() {
        let (pipeline, _) = pipeline();
        let err = pipeline
            .ingest(Path::new("/definitely/not/here"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::PathNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_root_is_noop() {
        let tmp = TempDir::new().unwrap();
        let (pipeline, _) = pipeline();
        let report = pipeline.ingest(tmp.path(), false).await.unwrap();
        assert_eq!(report.documents_processed, 0);
        assert_eq!(report.chunks_created, 0);

        let result = IngestResult::from(report);
        assert_eq!(result.status, IngestStatus::Success);
        assert!(result.message.starts_with("No documents found"));
    }

    #[tokio::test]
    async fn test_bad_file_is_warning() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.md"), "Readable notes.").unwrap();
        fs::write(tmp.path().join("bad.pdf"), "not a pdf").unwrap();
        let (pipeline, gateway) = pipeline();

        let report = pipeline.ingest(tmp.path(), false).await.unwrap();
        assert_eq!(report.documents_processed, 1);
        assert_eq!(report.chunks_created, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("bad.pdf"));
        assert_eq!(gateway.stats().await.unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_per_document() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "fine content").unwrap();
        fs::write(tmp.path().join("b.md"), "poison content").unwrap();
        let (pipeline, _) = pipeline_with(Arc::new(Picky));

        let report = pipeline.ingest(tmp.path(), false).await.unwrap();
        assert_eq!(report.documents_processed, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("b.md"));
    }

    #[tokio::test]
    async fn test_all_embeddings_failing_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.md"), "poison content").unwrap();
        let (pipeline, _) = pipeline_with(Arc::new(Picky));

        let err = pipeline.ingest(tmp.path(), false).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "some words ".repeat(60)).unwrap();
        let (pipeline, gateway) = pipeline();

        let report = pipeline.dry_run(tmp.path()).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.documents_processed, 1);
        assert!(report.chunks_created > 1);
        assert_eq!(gateway.stats().await.unwrap().record_count, 0);
        assert_eq!(IngestResult::from(report).status, IngestStatus::DryRun);
    }

    #[tokio::test]
    async fn test_force_reindex_drops_deleted_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "first").unwrap();
        fs::write(tmp.path().join("b.md"), "second").unwrap();
        let (pipeline, gateway) = pipeline();
        pipeline.ingest(tmp.path(), false).await.unwrap();
        assert_eq!(gateway.stats().await.unwrap().record_count, 2);

        fs::remove_file(tmp.path().join("b.md")).unwrap();
        pipeline.ingest(tmp.path(), false).await.unwrap();
        assert_eq!(gateway.stats().await.unwrap().record_count, 2);

        pipeline.ingest(tmp.path(), true).await.unwrap();
        assert_eq!(gateway.stats().await.unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn test_emptied_file_drops_its_records() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "Old content about login.").unwrap();
        fs::write(tmp.path().join("b.md"), "Other notes.").unwrap();
        let (pipeline, gateway) = pipeline();
        pipeline.ingest(tmp.path(), false).await.unwrap();

        fs::write(tmp.path().join("a.md"), "   \n").unwrap();
        let report = pipeline.ingest(tmp.path(), false).await.unwrap();
        assert_eq!(report.documents_processed, 1);
        let stats = gateway.stats().await.unwrap();
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.source_count, 1);
    }
}
