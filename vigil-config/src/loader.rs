use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;
use vigil_core::ScanConfig;

/// Environment variable overriding the server base URL.
pub const ENV_SERVER_URL: &str = "VIGIL_SERVER_URL";
/// Environment variable pointing at an explicit config file.
pub const ENV_CONFIG_PATH: &str = "VIGIL_CONFIG_PATH";

const DEFAULT_CONFIG_FILE: &str = "vigil.json";
const DEFAULT_SERVER_URL: &str = "http://localhost:5002";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid server url {url}: {source}")]
    ServerUrl { url: String, source: url::ParseError },
}

/// Source that produced the agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    File(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the monitoring server.
    pub server_url: String,
    /// Username for the form login. The password never lives in the config
    /// file; it is supplied at runtime.
    pub username: Option<String>,
    /// Shared request timeout for every server call, seconds.
    pub request_timeout_secs: u64,
    /// How often the agent re-reads the path registry and restarts the
    /// watch set when it changed, seconds.
    pub refresh_interval_secs: u64,
    /// Content-scan tuning, passed through to the engine.
    pub scan: ScanConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            username: None,
            request_timeout_secs: 10,
            refresh_interval_secs: 30,
            scan: ScanConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration. Evaluation order:
    /// 1) `$VIGIL_CONFIG_PATH` (hard error if unreadable),
    /// 2) `vigil.json` in the working directory (falls back to defaults on
    ///    any error, like the original tray build did),
    /// 3) defaults.
    /// `$VIGIL_SERVER_URL` overrides the base URL afterwards in all cases.
    pub fn load_from_env() -> Result<(Self, ConfigSource), ConfigError> {
        let (mut config, source) = if let Ok(path_str) = env::var(ENV_CONFIG_PATH)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            (Self::load_from_file(&path)?, ConfigSource::EnvPath(path))
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if path.is_file() {
                match Self::load_from_file(&path) {
                    Ok(config) => (config, ConfigSource::File(path)),
                    Err(err) => {
                        warn!(error = %err, "ignoring unreadable config file");
                        (Self::default(), ConfigSource::Default)
                    }
                }
            } else {
                (Self::default(), ConfigSource::Default)
            }
        };

        if let Ok(url) = env::var(ENV_SERVER_URL)
            && !url.trim().is_empty()
        {
            config.server_url = url.trim().to_string();
        }

        config.validate()?;
        Ok((config, source))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.server_url).map_err(|source| ConfigError::ServerUrl {
            url: self.server_url.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval_secs)
    }
}
