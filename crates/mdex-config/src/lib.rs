use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::search::SearchConfig;
use self::storage::StorageConfig;
use self::worker::WorkerConfig;

pub mod search;
pub mod storage;
pub mod worker;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    pub search: SearchConfig,

    /// `regcode_hex,email` used to unlock encrypted dictionaries
    pub passcode: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        let passcode = env::var("MDEX_PASSCODE").ok().filter(|v| !v.trim().is_empty());

        Config {
            storage: StorageConfig::new(),
            worker: WorkerConfig::new(),
            search: SearchConfig::new(),

            passcode,
        }
    }

    /// Load a JSON config file. Missing fields take their built-in defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Split the passcode into `(regcode, email)`
    pub fn passcode_parts(&self) -> Option<(&str, &str)> {
        let (regcode, email) = self.passcode.as_deref()?.split_once(',')?;
        Some((regcode.trim(), email.trim()))
    }
}
