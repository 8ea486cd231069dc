//! Run configuration.
//!
//! Values come from an optional YAML file; command-line flags override them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file names to search for.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["imdefects.yaml", ".imdefects.yaml"];

/// Environment variables consulted for the Materials Project key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["PMG_MAPI_KEY", "MP_API_KEY"];

pub const DEFAULT_API_ENDPOINT: &str = "https://api.materialsproject.org";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Materials Project API key
    pub mapi_key: Option<String>,
    pub api_endpoint: String,
    /// Request timeout for Materials Project queries
    pub timeout_ms: u64,
    /// Lifetime of cached structures; 0 disables the cache
    pub cache_ttl_hours: u32,
    /// Directory holding the `<mpid>/` calculation trees
    pub root: PathBuf,
    /// Directory the JSON reports are written to
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mapi_key: None,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            timeout_ms: 30_000,
            cache_ttl_hours: 168,
            root: PathBuf::from("."),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config at `path`, or the first default file found in `dir`.
    ///
    /// Falls back to built-in defaults when nothing is found.
    pub fn load(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::parse_file(path);
        }
        match discover(dir) {
            Some(found) => {
                log::info!("using config {}", found.display());
                Self::parse_file(found)
            }
            None => Ok(Self::default()),
        }
    }

    /// Resolve the API key: explicit value, config, then environment.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Option<String> {
        self.resolve_api_key_with(explicit, |name| std::env::var(name).ok())
    }

    fn resolve_api_key_with<F>(&self, explicit: Option<&str>, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        explicit
            .map(str::to_string)
            .or_else(|| self.mapi_key.clone())
            .or_else(|| API_KEY_ENV_VARS.iter().find_map(|name| env(*name)))
            .filter(|key| !key.trim().is_empty())
    }
}

/// Find a default config file in `dir`.
pub fn discover(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Validate a config after overrides are applied.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.api_endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("api_endpoint is empty".to_string()));
    }
    if !config.api_endpoint.starts_with("http://") && !config.api_endpoint.starts_with("https://")
    {
        return Err(ConfigError::Invalid(format!(
            "api_endpoint {:?} is not an http(s) url",
            config.api_endpoint
        )));
    }
    if config.timeout_ms == 0 {
        return Err(ConfigError::Invalid("timeout_ms must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_no_file() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(None, temp.path()).unwrap();
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.cache_ttl_hours, 168);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_discover_and_partial_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".imdefects.yaml"),
            "mapi_key: abc123\ntimeout_ms: 5000\n",
        )
        .unwrap();

        let config = Config::load(None, temp.path()).unwrap();
        assert_eq!(config.mapi_key.as_deref(), Some("abc123"));
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.output_dir, PathBuf::from("."));
    }

    #[test]
    fn test_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yaml");
        std::fs::write(&path, "timeout_ms: [not a number\n").unwrap();
        assert!(matches!(
            Config::parse_file(&path),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn test_api_key_precedence() {
        let config = Config {
            mapi_key: Some("from-config".to_string()),
            ..Default::default()
        };
        let env = |name: &str| match name {
            "MP_API_KEY" => Some("from-env".to_string()),
            _ => None,
        };

        assert_eq!(
            config.resolve_api_key_with(Some("from-cli"), env).as_deref(),
            Some("from-cli")
        );
        assert_eq!(
            config.resolve_api_key_with(None, env).as_deref(),
            Some("from-config")
        );

        let bare = Config::default();
        assert_eq!(
            bare.resolve_api_key_with(None, env).as_deref(),
            Some("from-env")
        );
        assert_eq!(bare.resolve_api_key_with(None, |_| None), None);
        assert_eq!(bare.resolve_api_key_with(Some("  "), |_| None), None);
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let config = Config {
            api_endpoint: "ftp://example.org".to_string(),
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }
}
