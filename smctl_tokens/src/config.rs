//! Persistent client configuration

use std::io;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{Options, Token, Username};

#[cfg(feature = "file")]
pub mod file;
pub mod in_memory;

#[cfg(feature = "file")]
pub use file::FileConfigStore;
pub use in_memory::InMemoryConfigStore;

/// Everything the CLI remembers between invocations
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The service manager base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,

    /// The user that logged in, if the password grant was used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Username>,

    /// Identity provider settings, including discovered endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Options>,

    /// The most recently issued token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
}

impl ClientConfig {
    /// Forgets the held token, keeping the target and identity provider settings
    pub fn clear_token(&mut self) {
        self.token = None;
    }
}

/// An error while reading or writing the client configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration could not be read or written
    #[error("error accessing client configuration")]
    Io(#[from] io::Error),
    /// The configuration is not in the expected format
    #[error("client configuration is malformed")]
    Format(#[from] serde_json::Error),
}

/// Storage for the client configuration
///
/// The configuration is loaded once when a command starts and saved at
/// most once when it finishes.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Loads the configuration, yielding the default when none was saved
    async fn load(&mut self) -> Result<ClientConfig, ConfigError>;

    /// Persists the configuration, replacing what was saved before
    async fn save(&mut self, config: &ClientConfig) -> Result<(), ConfigError>;
}
