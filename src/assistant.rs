//! The two operations the outside world calls: `ingest` and `query`.
//!
//! [`Assistant`] owns the configuration, the shared gateway, the ingestion
//! pipeline and the chain cache, and is what the CLI and HTTP server hold.
//! It is constructed once at startup and shared by reference.
//!
//! The configuration can be swapped at runtime with
//! [`Assistant::reload_config`] or [`Assistant::apply_config`]. LLM,
//! retrieval, loader and chunking settings take effect for the next request;
//! the embedder and the index stay open until restart.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::config::{self, Config};
use crate::error::{RagError, Result};
use crate::gateway::{GatewayStats, VectorStoreGateway};
use crate::ingest::{IngestResult, IngestionPipeline};
use crate::llm::{OllamaProvider, ProviderIdentity, ProviderKind};
use crate::manager::ChainManager;
use crate::models::Source;

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<Source>,
    pub provider_used: ProviderKind,
    pub model: String,
    pub privacy_note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub model: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub privacy: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsInfo {
    pub default: ProviderKind,
    pub local: ModelStatus,
    pub cloud: ModelStatus,
}

pub struct Assistant {
    config: RwLock<Arc<Config>>,
    config_path: Option<PathBuf>,
    gateway: Arc<VectorStoreGateway>,
    pipeline: RwLock<Arc<IngestionPipeline>>,
    chains: ChainManager,
}

impl Assistant {
    /// Open the persistent index described by `config`.
    pub async fn open(config: Config) -> Result<Self> {
        let gateway = Arc::new(VectorStoreGateway::open(&config).await?);
        Self::with_gateway(config, gateway)
    }

    /// Assemble around an existing gateway (an in-memory one in tests).
    pub fn with_gateway(config: Config, gateway: Arc<VectorStoreGateway>) -> Result<Self> {
        let chains = ChainManager::with_gateway(
            Arc::clone(&gateway),
            config.llm.clone(),
            config.retrieval.top_k,
        );
        Self::with_parts(config, gateway, chains)
    }

    pub fn with_parts(
        config: Config,
        gateway: Arc<VectorStoreGateway>,
        chains: ChainManager,
    ) -> Result<Self> {
        let pipeline = IngestionPipeline::from_config(&config, Arc::clone(&gateway))?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            config_path: None,
            gateway,
            pipeline: RwLock::new(Arc::new(pipeline)),
            chains,
        })
    }

    /// Remember the file the configuration came from, for [`Self::reload_config`].
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn chains(&self) -> &ChainManager {
        &self.chains
    }

    fn pipeline(&self) -> Arc<IngestionPipeline> {
        Arc::clone(&self.pipeline.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Re-read the configuration file and apply it.
    pub fn reload_config(&self) -> Result<Arc<Config>> {
        let path = self
            .config_path
            .as_deref()
            .ok_or_else(|| RagError::invalid_argument("no configuration file to reload from"))?;
        let fresh = config::load_config(path).map_err(|e| RagError::Config(format!("{:#}", e)))?;
        self.apply_config(fresh)
    }

    /// Validate `fresh`, rebuild the pipeline and drop every cached chain.
    pub fn apply_config(&self, fresh: Config) -> Result<Arc<Config>> {
        fresh
            .validate()
            .map_err(|e| RagError::Config(format!("{:#}", e)))?;

        let current = self.config();
        if needs_reopen(&current, &fresh) {
            warn!("embedding or index settings changed; they apply after a restart");
        }

        let pipeline = IngestionPipeline::from_config(&fresh, Arc::clone(&self.gateway))?;
        self.chains.reconfigure(ChainManager::gateway_factory(
            Arc::clone(&self.gateway),
            fresh.llm.clone(),
            fresh.retrieval.top_k,
        ));

        let fresh = Arc::new(fresh);
        *self.pipeline.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(pipeline);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&fresh);
        info!(
            default = %fresh.llm.default,
            local_model = %fresh.llm.local.model,
            "configuration applied"
        );
        Ok(fresh)
    }

    /// Index `root`, or `paths.docs_root` when `None`.
    pub async fn ingest(&self, root: Option<&Path>, force_reindex: bool) -> Result<IngestResult> {
        let root = root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config().paths.docs_root.clone());
        Ok(self.pipeline().ingest(&root, force_reindex).await?.into())
    }

    /// Load and split `root` without writing anything.
    pub async fn dry_run(&self, root: Option<&Path>) -> Result<IngestResult> {
        let root = root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config().paths.docs_root.clone());
        Ok(self.pipeline().dry_run(&root).await?.into())
    }

    /// Answer `question` with `provider`, or `llm.default` when `None`.
    pub async fn query(&self, question: &str, provider: Option<ProviderKind>) -> Result<QueryResult> {
        if question.trim().is_empty() {
            return Err(RagError::invalid_argument("question must not be empty"));
        }
        let config = self.config();
        let kind = provider.unwrap_or(config.llm.default);
        let identity = ProviderIdentity::resolve(kind, &config.llm);

        let chain = self.chains.get_chain(&identity)?;
        let answer = chain.answer(question).await?;

        Ok(QueryResult {
            answer: answer.answer,
            sources: answer.sources,
            provider_used: answer.provider_used.kind,
            model: answer.provider_used.model,
            privacy_note: answer.privacy_note,
        })
    }

    pub async fn stats(&self) -> Result<GatewayStats> {
        self.gateway.stats().await
    }

    /// Configured models; the local one is probed, the cloud one is
    /// available when a key is configured.
    pub async fn models(&self) -> ModelsInfo {
        let config = self.config();
        let local = &config.llm.local;
        let local_available = match OllamaProvider::new(local) {
            Ok(provider) => provider.health_check().await,
            Err(_) => false,
        };

        ModelsInfo {
            default: config.llm.default,
            local: ModelStatus {
                model: local.model.clone(),
                available: local_available,
                endpoint: Some(local.endpoint.clone()),
                privacy: "Fully local - your data never leaves your machine",
            },
            cloud: ModelStatus {
                model: config.llm.cloud.model.clone(),
                available: config.llm.cloud.credential().is_some(),
                endpoint: None,
                privacy: "Cloud-based - context is sent to Anthropic servers",
            },
        }
    }
}

/// Settings baked into the open gateway.
fn needs_reopen(current: &Config, fresh: &Config) -> bool {
    current.index_path() != fresh.index_path()
        || current.store.collection != fresh.store.collection
        || current.embedding.provider != fresh.embedding.provider
        || current.embedding.model != fresh.embedding.model
        || current.embedding.resolved_dims() != fresh.embedding.resolved_dims()
        || current.embedding.url != fresh.embedding.url
}
