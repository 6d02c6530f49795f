//! A configuration store backed by a local JSON file

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};

use super::{ClientConfig, ConfigError, ConfigStore};

/// A configuration store that uses a local file
///
/// The file holds secrets and is created readable by its owner only.
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Constructs a new file configuration store
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The location of the configuration file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_config(&self) -> Result<ClientConfig, ConfigError> {
        use tokio::io::AsyncReadExt;

        let mut file = match OpenOptions::new().read(true).open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no client configuration found");
                return Ok(ClientConfig::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut data = String::new();
        file.read_to_string(&mut data).await?;
        let config = serde_json::from_str(&data)?;
        Ok(config)
    }

    async fn write_config(&self, config: &ClientConfig) -> Result<(), ConfigError> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut file_opts = OpenOptions::new();

        file_opts.create(true).truncate(true).write(true);

        #[cfg(unix)]
        file_opts.mode(0o600);

        let mut file = file_opts.open(&self.path).await?;
        let data = serde_json::to_string_pretty(config)?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(path = %self.path.display(), "saved client configuration");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&mut self) -> Result<ClientConfig, ConfigError> {
        self.read_config().await
    }

    async fn save(&mut self, config: &ClientConfig) -> Result<(), ConfigError> {
        self.write_config(config).await
    }
}
