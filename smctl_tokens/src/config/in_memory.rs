//! An in-memory configuration store

use async_trait::async_trait;

use super::{ClientConfig, ConfigError, ConfigStore};

/// An in-memory configuration store
#[derive(Default, Debug)]
pub struct InMemoryConfigStore {
    config: Option<ClientConfig>,
    saves: usize,
}

impl InMemoryConfigStore {
    /// Constructs a new, empty in-memory store
    pub const fn new() -> Self {
        Self {
            config: None,
            saves: 0,
        }
    }

    /// Constructs a store that already holds `config`
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config: Some(config),
            saves: 0,
        }
    }

    /// How many times the configuration has been saved
    pub fn saves(&self) -> usize {
        self.saves
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&mut self) -> Result<ClientConfig, ConfigError> {
        Ok(self.config.clone().unwrap_or_default())
    }

    async fn save(&mut self, config: &ClientConfig) -> Result<(), ConfigError> {
        self.config = Some(config.clone());
        self.saves += 1;
        Ok(())
    }
}
