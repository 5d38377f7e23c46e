use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_channel_capacity() -> usize {
    16
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    /// Executable launched as `<exe> worker`, current executable when unset
    pub exe: Option<PathBuf>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Bound of the coordinator-side result channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl WorkerConfig {
    pub fn new() -> Self {
        let exe = env::var_os("MDEX_WORKER_EXE").map(PathBuf::from);

        let timeout_ms = env::var("MDEX_WORKER_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_timeout_ms);

        let channel_capacity = env::var("MDEX_WORKER_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or_else(default_channel_capacity);

        Self {
            exe,
            timeout_ms,
            channel_capacity,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            exe: None,
            timeout_ms: default_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}
