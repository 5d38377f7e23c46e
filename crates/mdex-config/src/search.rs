use std::env;

use serde::{Deserialize, Serialize};

fn default_autocomplete_limit() -> i64 {
    50
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// Negative means unlimited
    #[serde(default = "default_autocomplete_limit")]
    pub autocomplete_limit: i64,
}

impl SearchConfig {
    pub fn new() -> Self {
        let autocomplete_limit = env::var("MDEX_AUTOCOMPLETE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_autocomplete_limit);

        Self { autocomplete_limit }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            autocomplete_limit: default_autocomplete_limit(),
        }
    }
}
