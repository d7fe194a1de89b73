//! Runtime configuration: structures, JSON file loading, and merge-onto-defaults.
//!
//! A config file is a JSON document with the shape
//! `{agent, agents?, session?, memory?, max_iterations?, system_prompt?}`.
//! [`RuntimeConfig::load`] parses the file and merges it onto
//! [`RuntimeConfig::default`]: non-zero scalar fields override, non-empty maps
//! override. Callers (the CLI) then apply flag overrides on top.
//!
//! **Interaction**: consumed by the agent registry (per-agent [`AgentConfig`])
//! and by the CLI to wire the kernel (memory path, iteration budget, system
//! prompt).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for the expected shape.
    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Provider endpoint description: where requests go and how they authenticate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name, e.g. `"openai"`. Informational; routing uses `base_url`.
    #[serde(default)]
    pub name: String,
    /// Base URL of an OpenAI-compatible API, e.g. `"https://api.openai.com/v1"`.
    #[serde(default)]
    pub base_url: String,
    /// Bearer token. When absent, the client sends no Authorization header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Extra headers attached to every request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Model selection plus its declared capability map.
///
/// Capability keys are protocol tags (`chat`, `vision`, `tools`, `embeddings`,
/// `audio`); values are per-protocol option maps passed through to the
/// provider. Unknown tags are ignored by the registry when deriving
/// capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name as the provider expects it.
    #[serde(default)]
    pub name: String,
    /// Protocol tag -> default options for calls using that protocol.
    #[serde(default)]
    pub capabilities: HashMap<String, serde_json::Value>,
}

/// One agent endpoint: a provider plus a model on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

/// Session settings. Currently empty; sessions are in-memory and self-keyed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {}

/// Memory store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Path of the sqlite-backed store. `None` disables persistent memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// The default agent the kernel runs against.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Additional named agents for the registry.
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Kernel iteration budget; `0` means unbounded.
    #[serde(default)]
    pub max_iterations: u32,
    /// System prompt prepended to every run.
    #[serde(default)]
    pub system_prompt: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mut capabilities = HashMap::new();
        capabilities.insert("chat".to_string(), serde_json::json!({}));
        capabilities.insert("tools".to_string(), serde_json::json!({}));
        Self {
            agent: AgentConfig {
                provider: ProviderConfig {
                    name: "openai".to_string(),
                    base_url: "https://api.openai.com/v1".to_string(),
                    api_key: None,
                    headers: HashMap::new(),
                },
                model: ModelConfig {
                    name: "gpt-4o-mini".to_string(),
                    capabilities,
                },
            },
            agents: HashMap::new(),
            session: SessionConfig {},
            memory: MemoryConfig { path: None },
            max_iterations: 10,
            system_prompt: String::new(),
        }
    }
}

impl RuntimeConfig {
    /// Loads the JSON file at `path` and merges it onto the defaults.
    ///
    /// Merge discipline: non-zero scalars override, non-empty maps override;
    /// everything absent in the file keeps its default.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let overlay: RuntimeConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let mut config = Self::default();
        config.merge_from(overlay);
        Ok(config)
    }

    /// Applies `overlay` on top of `self`.
    ///
    /// Scalars override when non-zero/non-empty; maps override when non-empty.
    pub fn merge_from(&mut self, overlay: RuntimeConfig) {
        self.agent.merge_from(overlay.agent);
        if !overlay.agents.is_empty() {
            self.agents = overlay.agents;
        }
        if overlay.memory.path.is_some() {
            self.memory.path = overlay.memory.path;
        }
        if overlay.max_iterations != 0 {
            self.max_iterations = overlay.max_iterations;
        }
        if !overlay.system_prompt.is_empty() {
            self.system_prompt = overlay.system_prompt;
        }
    }
}

impl AgentConfig {
    /// Field-wise merge; empty overlay fields keep the current value.
    pub fn merge_from(&mut self, overlay: AgentConfig) {
        if !overlay.provider.name.is_empty() {
            self.provider.name = overlay.provider.name;
        }
        if !overlay.provider.base_url.is_empty() {
            self.provider.base_url = overlay.provider.base_url;
        }
        if overlay.provider.api_key.is_some() {
            self.provider.api_key = overlay.provider.api_key;
        }
        if !overlay.provider.headers.is_empty() {
            self.provider.headers = overlay.provider.headers;
        }
        if !overlay.model.name.is_empty() {
            self.model.name = overlay.model.name;
        }
        if !overlay.model.capabilities.is_empty() {
            self.model.capabilities = overlay.model.capabilities;
        }
    }
}
