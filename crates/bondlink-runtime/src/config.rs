//! Runtime configuration: optional TOML file, then CLI/env overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use bondlink_core::policy::{DEFAULT_NEVER_DEDUP, DedupPolicy};
use bondlink_core::types::{CoreError, EventKind};
use bondlink_engine::diagnostics::DEFAULT_DIAGNOSTICS_CAPACITY;
use bondlink_engine::EngineConfig;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:2663";
pub const STORE_FILE_NAME: &str = "conversations.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("never_dedup: {0}")]
    NeverDedup(#[from] CoreError),

    #[error("backend_url must start with http:// or https://, got {0:?}")]
    BackendUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: 1,
            max_backoff_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub backend_url: String,
    pub data_dir: PathBuf,
    /// Event kind names (`agent_started`, `task_completed`, ...).
    pub never_dedup: Vec<String>,
    pub reconnect: ReconnectConfig,
    pub diagnostics_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            data_dir: default_data_dir(),
            never_dedup: DEFAULT_NEVER_DEDUP
                .iter()
                .map(|k| k.as_str().to_string())
                .collect(),
            reconnect: ReconnectConfig::default(),
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Load from `path`, or from the default location when `None`.
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Reject values that would only fail later at connect time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(ConfigError::BackendUrl(self.backend_url.clone()));
        }
        self.dedup_policy()?;
        Ok(())
    }

    pub fn dedup_policy(&self) -> Result<DedupPolicy, CoreError> {
        let kinds = self
            .never_dedup
            .iter()
            .map(|name| name.parse::<EventKind>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DedupPolicy::with_never_dedup(kinds))
    }

    pub fn engine_config(&self) -> Result<EngineConfig, CoreError> {
        Ok(EngineConfig {
            dedup: self.dedup_policy()?,
            diagnostics_capacity: self.diagnostics_capacity,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }

    /// Backend URL without trailing slash.
    pub fn base_url(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    /// Engine.IO v4 WebSocket endpoint for the backend.
    pub fn socket_url(&self) -> String {
        let base = self.base_url();
        let ws = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws}/socket.io/?EIO=4&transport=websocket")
    }
}

/// `$XDG_CONFIG_HOME/bondlink/config.toml`, else `~/.config/bondlink/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("bondlink").join("config.toml");
    }
    home_dir().join(".config").join("bondlink").join("config.toml")
}

/// `$XDG_DATA_HOME/bondlink`, else `~/.local/share/bondlink`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(dir).join("bondlink");
    }
    home_dir().join(".local").join("share").join("bondlink")
}

fn home_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home),
        Err(_) => {
            let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
            PathBuf::from(format!("/tmp/bondlink-{user}"))
        }
    }
}
