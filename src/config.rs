use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config_validator::ConfigValidator;
use crate::error::ConfigError;
use crate::rate_limit_config::Quota;

pub const DEFAULT_PORT: u16 = 9212;
pub const DEFAULT_STORAGE_PATH: &str = "/tmp/anonkv.db";

/// Server configuration, read once at startup and shared read-only afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server port number
    pub port: u16,

    /// Optional base path every route is mounted under
    pub base: String,

    /// Verbosity level; above zero enables store audit lines
    pub verbose: u8,

    /// Report log timestamps in UTC instead of local time
    pub utc: bool,

    /// Storage file path, or `:memory:` for an in-process store
    #[serde(rename = "db")]
    pub storage_path: String,

    /// Admission quota, written as `<count>-<unit>` in the file
    pub rate: Quota,

    /// Optional log file; stdout when empty
    pub log_file: String,

    /// Default hash algorithm: sha1, sha256 or sha512
    pub sha: String,

    /// Key clients on `X-Forwarded-For` / `X-Real-IP` instead of the peer
    /// address; only safe behind a proxy that overwrites those headers
    pub trust_forward_header: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            base: String::new(),
            verbose: 0,
            utc: false,
            storage_path: DEFAULT_STORAGE_PATH.to_string(),
            rate: Quota::default(),
            log_file: String::new(),
            sha: String::new(),
            trust_forward_header: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&data)
    }

    /// Parse configuration from JSON text, filling unset fields with defaults
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(data)?;
        config.apply_defaults();
        ConfigValidator::validate_config(&config)?;
        Ok(config)
    }

    /// Zero or empty values select the defaults
    fn apply_defaults(&mut self) {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.storage_path.is_empty() {
            self.storage_path = DEFAULT_STORAGE_PATH.to_string();
        }
    }

    /// Base path without a trailing slash; empty when routes live at the root
    pub fn base_path(&self) -> &str {
        self.base.trim_end_matches('/')
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose > 0
    }

    /// Compact JSON rendering used for the startup log line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
