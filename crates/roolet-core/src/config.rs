use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RooletError;

/// Environment variable naming the JSON configuration file (`spec.md` §6).
pub const ENV_PATH_VAR: &str = "ROOLET_CONG";

fn default_workers() -> usize {
    1
}
fn default_addr() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7551
}
fn default_iter() -> f64 {
    0.2
}
fn default_status_time() -> f64 {
    2.0
}
fn default_log() -> String {
    "/var/log/roolet.log".to_string()
}
fn default_log_level() -> String {
    "DEBUG".to_string()
}
fn default_reconnect_delay() -> f64 {
    1.0
}
fn default_crypto_algorithm() -> String {
    "RS256".to_string()
}
fn default_crypto_pub_key_name() -> String {
    "pub.key".to_string()
}

/// Runtime configuration for an [`crate::engine::Engine`], mirroring every
/// key `spec.md` §6 names with the defaults it lists.
///
/// Grounded on `original_source/clients/python3/roolet/config.py`'s
/// `Configuration(dict)`, which loads a JSON file located by an environment
/// variable and exposes the result as typed attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_iter")]
    pub iter: f64,
    #[serde(default = "default_status_time")]
    pub status_time: f64,
    #[serde(default = "default_log")]
    pub log: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Carried as data only; this crate never installs a subscriber itself.
    #[serde(default)]
    pub logger: Option<String>,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: f64,
    #[serde(default = "default_crypto_algorithm")]
    pub crypto_algorithm: String,
    #[serde(default = "default_crypto_pub_key_name")]
    pub crypto_pub_key_name: String,
    #[serde(default)]
    pub crypto_priv_key_path: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            addr: default_addr(),
            port: default_port(),
            iter: default_iter(),
            status_time: default_status_time(),
            log: default_log(),
            log_level: default_log_level(),
            logger: None,
            reconnect_delay: default_reconnect_delay(),
            crypto_algorithm: default_crypto_algorithm(),
            crypto_pub_key_name: default_crypto_pub_key_name(),
            crypto_priv_key_path: None,
        }
    }
}

impl Configuration {
    /// Loads the path named by [`ENV_PATH_VAR`] and parses it as JSON.
    pub fn from_env() -> Result<Self, RooletError> {
        let path = std::env::var(ENV_PATH_VAR)
            .map_err(|_| RooletError::ConfigEnvMissing(ENV_PATH_VAR))?;
        Self::from_path(path)
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, RooletError> {
        let path = path.into();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| RooletError::ConfigRead {
                path: path.clone(),
                source,
            })?;
        serde_json::from_str(&contents).map_err(RooletError::ConfigParse)
    }

    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Zero means "retry forever on a fixed `reconnect_delay`"; negative or
    /// absent in the source JSON disables reconnection entirely.
    pub fn reconnect_enabled(&self) -> bool {
        self.reconnect_delay > 0.0
    }
}

/// Builder for inline configuration, the counterpart to
/// `Configuration(auto=False, **kwargs)` in the Python original.
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    inner: Configuration,
}

impl ConfigurationBuilder {
    pub fn workers(mut self, workers: usize) -> Self {
        self.inner.workers = workers;
        self
    }

    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.inner.addr = addr.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.inner.port = port;
        self
    }

    pub fn iter(mut self, iter: f64) -> Self {
        self.inner.iter = iter;
        self
    }

    pub fn status_time(mut self, status_time: f64) -> Self {
        self.inner.status_time = status_time;
        self
    }

    pub fn reconnect_delay(mut self, reconnect_delay: f64) -> Self {
        self.inner.reconnect_delay = reconnect_delay;
        self
    }

    pub fn crypto_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.inner.crypto_algorithm = algorithm.into();
        self
    }

    pub fn crypto_pub_key_name(mut self, name: impl Into<String>) -> Self {
        self.inner.crypto_pub_key_name = name.into();
        self
    }

    pub fn crypto_priv_key_path(mut self, path: impl AsRef<Path>) -> Self {
        self.inner.crypto_priv_key_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> Configuration {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = Configuration::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.addr, "127.0.0.1");
        assert_eq!(config.port, 7551);
        assert_eq!(config.crypto_algorithm, "RS256");
        assert!(config.reconnect_enabled());
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: Configuration = serde_json::from_str("{\"workers\": 4}").unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.port, 7551);
    }

    #[test]
    fn from_path_reports_missing_env_overridden_by_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roolet.json");
        std::fs::write(&path, "{\"workers\": 2, \"port\": 9000}").unwrap();

        let config = Configuration::from_path(&path).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn unreadable_path_is_config_read_error() {
        let err = Configuration::from_path("/nonexistent/roolet.json").unwrap_err();
        assert!(matches!(err, RooletError::ConfigRead { .. }));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = Configuration::builder()
            .workers(8)
            .addr("0.0.0.0")
            .port(9999)
            .reconnect_delay(0.0)
            .build();
        assert_eq!(config.workers, 8);
        assert!(!config.reconnect_enabled());
    }
}
