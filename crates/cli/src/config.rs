//! Server configuration: optional TOML file plus environment overrides.
//!
//! ```toml
//! [server]
//! port = 8080
//! rate_limit = 60
//!
//! [registry]
//! event_capacity = 256
//! ```
//!
//! `REAP_RATE_LIMIT` and `REAP_API_KEY` override the file. The API key is
//! only read from the environment so it never lands in a config file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default listen port.
pub(crate) const DEFAULT_PORT: u16 = 8080;

/// Default rate limit: 60 requests per minute per IP.
pub(crate) const DEFAULT_RATE_LIMIT: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerSection {
    pub(crate) port: u16,
    pub(crate) rate_limit: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            rate_limit: DEFAULT_RATE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RegistrySection {
    pub(crate) event_capacity: usize,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            event_capacity: reap_registry::DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub(crate) server: ServerSection,
    pub(crate) registry: RegistrySection,
    /// Never read from the file; see module docs.
    #[serde(skip)]
    pub(crate) api_key: Option<String>,
}

impl Config {
    /// Load the config file (if any), then apply environment overrides.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = lookup("REAP_RATE_LIMIT") {
            self.server.rate_limit = value.parse().map_err(|_| ConfigError::Env {
                var: "REAP_RATE_LIMIT",
                value,
            })?;
        }
        self.api_key = lookup("REAP_API_KEY").filter(|k| !k.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(
            config.registry.event_capacity,
            reap_registry::DEFAULT_EVENT_CAPACITY
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("[server]\nhost = \"x\"\n").is_err());
    }

    #[test]
    fn env_overrides_rate_limit_and_sets_api_key() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("REAP_RATE_LIMIT", "5"), ("REAP_API_KEY", "s3cret")]))
            .unwrap();
        assert_eq!(config.server.rate_limit, 5);
        assert_eq!(config.api_key.as_deref(), Some("s3cret"));
    }

    #[test]
    fn empty_api_key_means_no_auth() {
        let mut config = Config::default();
        config.apply_env(env(&[("REAP_API_KEY", "")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn bad_rate_limit_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("REAP_RATE_LIMIT", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("REAP_RATE_LIMIT"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reap.toml");
        std::fs::write(&path, "[registry]\nevent_capacity = 8\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.registry.event_capacity, 8);

        let missing = Config::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
