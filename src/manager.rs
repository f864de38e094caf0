//! Per-provider chain cache.
//!
//! [`ChainManager`] builds a [`RagChain`] the first time a
//! [`ProviderIdentity`] is requested and hands out the same `Arc` for the
//! rest of the process. Construction happens under the map's shard lock, so
//! racing first calls for one identity build exactly one chain. The lock is
//! released before the caller uses the chain; generation never runs under
//! it. A failed construction leaves no entry behind and is retried on the
//! next call.
//!
//! [`ChainManager::reconfigure`] swaps the factory and empties the cache in
//! one step, so no chain built from the previous settings survives it.

use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use crate::chain::RagChain;
use crate::config::LlmConfig;
use crate::error::Result;
use crate::gateway::VectorStoreGateway;
use crate::llm::{LlmProvider, ProviderIdentity};

/// Builds a chain for an identity.
pub type ChainFactory = Arc<dyn Fn(&ProviderIdentity) -> Result<RagChain> + Send + Sync>;

pub struct ChainManager {
    chains: DashMap<ProviderIdentity, Arc<RagChain>>,
    factory: RwLock<ChainFactory>,
}

impl ChainManager {
    pub fn new(factory: ChainFactory) -> Self {
        Self {
            chains: DashMap::new(),
            factory: RwLock::new(factory),
        }
    }

    /// Manager whose chains share `gateway` and build providers from `llm`.
    pub fn with_gateway(gateway: Arc<VectorStoreGateway>, llm: LlmConfig, top_k: i64) -> Self {
        Self::new(Self::gateway_factory(gateway, llm, top_k))
    }

    pub fn gateway_factory(
        gateway: Arc<VectorStoreGateway>,
        llm: LlmConfig,
        top_k: i64,
    ) -> ChainFactory {
        Arc::new(move |identity: &ProviderIdentity| {
            let provider = LlmProvider::build(identity, &llm)?;
            Ok(RagChain::new(Arc::clone(&gateway), provider, top_k))
        })
    }

    pub fn get_chain(&self, identity: &ProviderIdentity) -> Result<Arc<RagChain>> {
        // Held across lookup and insert so `reconfigure` cannot interleave.
        let factory = self.factory.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(chain) = self.chains.get(identity) {
            return Ok(Arc::clone(chain.value()));
        }

        let entry = self
            .chains
            .entry(identity.clone())
            .or_try_insert_with(|| {
                info!(provider = %identity, "building chain");
                (**factory)(identity).map(Arc::new)
            })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Build future chains with `factory` and drop every cached one.
    pub fn reconfigure(&self, factory: ChainFactory) {
        let mut current = self.factory.write().unwrap_or_else(PoisonError::into_inner);
        *current = factory;
        self.clear();
    }

    /// Drop every cached chain, e.g. after a configuration change.
    pub fn clear(&self) {
        self.chains.clear();
    }

    pub fn cached(&self) -> Vec<ProviderIdentity> {
        let mut identities: Vec<ProviderIdentity> =
            self.chains.iter().map(|e| e.key().clone()).collect();
        identities.sort_by_key(|i| i.to_string());
        identities
    }
}
