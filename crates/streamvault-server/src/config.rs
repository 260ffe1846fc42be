//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Errors loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that was attempted.
        path: String,
        /// Underlying TOML failure.
        #[source]
        source: toml::de::Error,
    },
}

/// Configuration for one vault instance, loaded from `streamvault.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Name this vault registers under.
    pub name: String,
    /// Listen address for the HTTP server.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Root directory for stream payloads.
    pub data_dir: PathBuf,
    /// Directory for the metadata catalog.
    pub catalog_dir: PathBuf,
    /// Shared secret presented by the assignment service on
    /// `POST /streams/activate`.
    pub password: String,
    /// Seconds a session lives without a heartbeat.
    #[serde(default = "default_expiration_seconds")]
    pub expiration_seconds: u64,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_owned()
}

fn default_expiration_seconds() -> u64 {
    1200
}

impl VaultConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when the file is unreadable or malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Session expiration as a [`Duration`].
    #[must_use]
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("streamvault.toml");
        std::fs::write(
            &path,
            r#"
name = "vault0"
data_dir = "/var/lib/streamvault/data"
catalog_dir = "/var/lib/streamvault/catalog"
password = "secret"
"#,
        )
        .unwrap();
        let config = VaultConfig::load(&path).unwrap();
        assert_eq!(config.name, "vault0");
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.expiration_seconds, 1200);
        assert_eq!(config.expiration(), Duration::from_secs(1200));
    }

    #[test]
    fn test_missing_field_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("streamvault.toml");
        std::fs::write(&path, "name = \"vault0\"\n").unwrap();
        assert!(matches!(
            VaultConfig::load(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }
}
