//! Named agent endpoints, instantiated lazily.
//!
//! The registry stores `name -> config` plus a memoized instance. [`Get`]
//! materializes an [`OpenAiCompatAgent`] from config on first use, so unused
//! configurations never open network clients. [`Replace`] drops the memoized
//! instance; the next `get` re-instantiates. Capability listing derives from
//! config alone, without instantiation.
//!
//! [`Get`]: AgentRegistry::get
//! [`Replace`]: AgentRegistry::replace

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use env_config::AgentConfig;

use crate::protocol::Protocol;

use super::{Agent, OpenAiCompatAgent};

/// Agent registry error.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent name must not be empty")]
    EmptyName,

    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("agent already registered: {0}")]
    Exists(String),
}

/// Listing entry: a name plus the protocols its config declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    pub name: String,
    pub capabilities: Vec<Protocol>,
}

struct AgentEntry {
    config: AgentConfig,
    instance: Option<Arc<dyn Agent>>,
}

/// Lazy-instantiated `name -> agent` catalog.
pub struct AgentRegistry {
    entries: RwLock<HashMap<String, AgentEntry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new named endpoint. Fails on an empty or taken name.
    pub async fn register(&self, name: &str, config: AgentConfig) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let mut entries = self.entries.write().await;
        if entries.contains_key(name) {
            return Err(RegistryError::Exists(name.to_string()));
        }
        entries.insert(
            name.to_string(),
            AgentEntry {
                config,
                instance: None,
            },
        );
        Ok(())
    }

    /// Swaps the config under an existing name and invalidates the memoized
    /// instance, so the next [`get`](Self::get) re-instantiates.
    pub async fn replace(&self, name: &str, config: AgentConfig) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let mut entries = self.entries.write().await;
        match entries.get_mut(name) {
            Some(entry) => {
                entry.config = config;
                entry.instance = None;
                Ok(())
            }
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    /// Removes a named endpoint.
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().await;
        entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Returns the agent for `name`, instantiating and memoizing on first use.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Agent>, RegistryError> {
        {
            let entries = self.entries.read().await;
            match entries.get(name) {
                Some(entry) => {
                    if let Some(instance) = &entry.instance {
                        return Ok(Arc::clone(instance));
                    }
                }
                None => return Err(RegistryError::NotFound(name.to_string())),
            }
        }
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        // Another caller may have raced us here; reuse its instance.
        if let Some(instance) = &entry.instance {
            return Ok(Arc::clone(instance));
        }
        let instance: Arc<dyn Agent> = Arc::new(OpenAiCompatAgent::from_config(name, &entry.config));
        entry.instance = Some(Arc::clone(&instance));
        Ok(instance)
    }

    /// Protocols declared in the config's capability map, sorted, unknown tags
    /// filtered. Never instantiates.
    pub async fn capabilities(&self, name: &str) -> Result<Vec<Protocol>, RegistryError> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(Self::derive_capabilities(&entry.config))
    }

    /// All registrations with their capabilities, sorted by name.
    pub async fn list(&self) -> Vec<AgentInfo> {
        let entries = self.entries.read().await;
        let mut infos: Vec<AgentInfo> = entries
            .iter()
            .map(|(name, entry)| AgentInfo {
                name: name.clone(),
                capabilities: Self::derive_capabilities(&entry.config),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    fn derive_capabilities(config: &AgentConfig) -> Vec<Protocol> {
        let mut capabilities: Vec<Protocol> = config
            .model
            .capabilities
            .keys()
            .filter_map(|tag| tag.parse::<Protocol>().ok())
            .collect();
        capabilities.sort();
        capabilities
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(tags: &[&str]) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.provider.base_url = "http://localhost:1/v1".to_string();
        config.model.name = "m".to_string();
        config.model.capabilities = tags
            .iter()
            .map(|t| (t.to_string(), serde_json::json!({})))
            .collect();
        config
    }

    /// **Scenario**: duplicate register fails with Exists; replace of an
    /// absent name fails with NotFound; empty names rejected.
    #[tokio::test]
    async fn registration_discipline() {
        let registry = AgentRegistry::new();
        registry.register("a", config_with(&["chat"])).await.unwrap();

        assert!(matches!(
            registry.register("a", config_with(&["chat"])).await,
            Err(RegistryError::Exists(_))
        ));
        assert!(matches!(
            registry.replace("ghost", config_with(&["chat"])).await,
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.register("", config_with(&["chat"])).await,
            Err(RegistryError::EmptyName)
        ));
    }

    /// **Scenario**: get memoizes the instance; replace invalidates it so the
    /// next get builds a fresh one.
    #[tokio::test]
    async fn get_memoizes_and_replace_invalidates() {
        let registry = AgentRegistry::new();
        registry.register("a", config_with(&["chat"])).await.unwrap();

        let first = registry.get("a").await.unwrap();
        let second = registry.get("a").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        registry.replace("a", config_with(&["chat", "tools"])).await.unwrap();
        let third = registry.get("a").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    /// **Scenario**: capabilities are sorted and unknown tags filtered,
    /// without instantiation.
    #[tokio::test]
    async fn capabilities_sorted_and_filtered() {
        let registry = AgentRegistry::new();
        registry
            .register("a", config_with(&["tools", "chat", "telepathy", "audio"]))
            .await
            .unwrap();

        let capabilities = registry.capabilities("a").await.unwrap();
        assert_eq!(
            capabilities,
            vec![Protocol::Chat, Protocol::Tools, Protocol::Audio]
        );
    }

    /// **Scenario**: list is sorted by name and unregister removes entries.
    #[tokio::test]
    async fn list_sorted_and_unregister() {
        let registry = AgentRegistry::new();
        registry.register("zeta", config_with(&["chat"])).await.unwrap();
        registry.register("alpha", config_with(&["chat"])).await.unwrap();

        let names: Vec<String> = registry.list().await.into_iter().map(|i| i.name).collect();
        assert_eq!(names, ["alpha", "zeta"]);

        registry.unregister("zeta").await.unwrap();
        assert!(matches!(
            registry.unregister("zeta").await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
