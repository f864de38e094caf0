//! Language model providers.
//!
//! [`LlmProvider`] is a closed set: a local Ollama server or the Anthropic
//! Messages API. The kind is chosen once when a chain is built; after that
//! the chain only ever calls [`LlmProvider::generate`].
//!
//! The cloud provider checks for its credential in the constructor, so a
//! missing key fails before any retrieval or generation work happens.
//! Neither provider retries: transport failures and non-success statuses
//! surface as [`RagError::ProviderUnavailable`] after the client's own
//! timeout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{CloudLlmConfig, LlmConfig, LocalLlmConfig};
use crate::error::{RagError, Result};

pub const LOCAL_PRIVACY_NOTE: &str = "Processed locally with Ollama - your code stayed private.";
pub const CLOUD_PRIVACY_NOTE: &str =
    "⚠ Processed with Claude API - context was sent to Anthropic servers.";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Where generation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local model server; nothing leaves the machine.
    #[default]
    #[serde(alias = "ollama", alias = "local-model")]
    Local,
    /// Remote API; retrieved context is sent off-machine.
    #[serde(alias = "claude", alias = "cloud-model")]
    Cloud,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Cloud => "cloud",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "ollama" | "local-model" => Ok(ProviderKind::Local),
            "cloud" | "claude" | "cloud-model" => Ok(ProviderKind::Cloud),
            other => Err(RagError::invalid_argument(format!(
                "unknown provider '{}': expected local or cloud",
                other
            ))),
        }
    }
}

/// Cache key for chains: provider kind plus resolved model name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProviderIdentity {
    pub kind: ProviderKind,
    pub model: String,
}

impl ProviderIdentity {
    pub fn resolve(kind: ProviderKind, config: &LlmConfig) -> Self {
        let model = match kind {
            ProviderKind::Local => config.local.model.clone(),
            ProviderKind::Cloud => config.cloud.model.clone(),
        };
        Self { kind, model }
    }
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.model)
    }
}

pub enum LlmProvider {
    Local(OllamaProvider),
    Cloud(AnthropicProvider),
}

impl LlmProvider {
    /// Build the provider for `identity`. The cloud variant fails with
    /// [`RagError::CredentialMissing`] when no key is configured.
    pub fn build(identity: &ProviderIdentity, config: &LlmConfig) -> Result<Self> {
        match identity.kind {
            ProviderKind::Local => {
                let mut local = config.local.clone();
                local.model = identity.model.clone();
                Ok(LlmProvider::Local(OllamaProvider::new(&local)?))
            }
            ProviderKind::Cloud => {
                let mut cloud = config.cloud.clone();
                cloud.model = identity.model.clone();
                Ok(LlmProvider::Cloud(AnthropicProvider::new(&cloud)?))
            }
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        match self {
            LlmProvider::Local(p) => p.generate(prompt).await,
            LlmProvider::Cloud(p) => p.generate(prompt).await,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            LlmProvider::Local(_) => ProviderKind::Local,
            LlmProvider::Cloud(_) => ProviderKind::Cloud,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            LlmProvider::Local(p) => &p.model,
            LlmProvider::Cloud(p) => &p.model,
        }
    }

    pub fn identity(&self) -> ProviderIdentity {
        ProviderIdentity {
            kind: self.kind(),
            model: self.model().to_string(),
        }
    }

    pub fn privacy_note(&self) -> &'static str {
        match self {
            LlmProvider::Local(_) => LOCAL_PRIVACY_NOTE,
            LlmProvider::Cloud(_) => CLOUD_PRIVACY_NOTE,
        }
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::provider_unavailable(format!("cannot build HTTP client: {}", e)))
}

// ============ Ollama ============

/// `POST /api/generate` against a local Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OllamaProvider {
    pub fn new(config: &LocalLlmConfig) -> Result<Self> {
        info!(model = %config.model, endpoint = %config.endpoint, "using local model");
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::provider_unavailable(format!(
                    "cannot reach Ollama at {} (is it running?): {}",
                    self.endpoint, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::provider_unavailable(format!(
                "Ollama returned {}: {}",
                status, text
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            RagError::provider_unavailable(format!("invalid Ollama response: {}", e))
        })?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| RagError::provider_unavailable("Ollama response has no 'response' field"))
    }

    /// Names of the models the server has pulled (`GET /api/tags`).
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await
            .map_err(|e| RagError::provider_unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RagError::provider_unavailable(format!(
                "Ollama returned {}",
                response.status()
            )));
        }
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::provider_unavailable(e.to_string()))?;

        Ok(json
            .get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn health_check(&self) -> bool {
        self.list_models().await.is_ok()
    }
}

// ============ Anthropic ============

/// Anthropic Messages API (`POST /v1/messages`).
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(config: &CloudLlmConfig) -> Result<Self> {
        let api_key = config.credential().ok_or_else(|| {
            RagError::CredentialMissing(
                "no Anthropic API key configured; set ANTHROPIC_API_KEY or llm.cloud.api_key"
                    .to_string(),
            )
        })?;

        warn!(
            "cloud provider selected: retrieved code and docs will be sent to Anthropic's servers; \
             use the local provider to keep everything on this machine"
        );
        info!(model = %config.model, "using cloud model");

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::provider_unavailable(format!("cannot reach Anthropic API: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::provider_unavailable(format!(
                "Anthropic API returned {}: {}",
                status, text
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            RagError::provider_unavailable(format!("invalid Anthropic response: {}", e))
        })?;
        parse_messages_response(&json)
    }
}

/// Concatenate the `text` blocks of a Messages API response.
fn parse_messages_response(json: &serde_json::Value) -> Result<String> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| RagError::provider_unavailable("Anthropic response has no content"))?;

    Ok(blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}
