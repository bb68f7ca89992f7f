use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::error::{CoreResult, ForgeError};
use crate::poll::{Backoff, RetryPolicy};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ApiCfg {
    /// Backend origin; endpoint paths (`/api/...`) are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ApiCfg {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds. None = no overall timeout, which
    /// is what chat streams want; a long reply must not be cut off.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: None,
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackoffCfg {
    Fixed,
    Exponential {
        multiplier: f64,
        max_interval_ms: u64,
    },
}

impl Default for BackoffCfg {
    fn default() -> Self {
        Self::Fixed
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PollCfg {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub backoff: BackoffCfg,
}

impl Default for PollCfg {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            backoff: BackoffCfg::default(),
        }
    }
}

fn default_max_attempts() -> u32 {
    30
}
fn default_interval_ms() -> u64 {
    2_000
}

impl PollCfg {
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match &self.backoff {
            BackoffCfg::Fixed => Backoff::Fixed,
            BackoffCfg::Exponential {
                multiplier,
                max_interval_ms,
            } => Backoff::Exponential {
                multiplier: *multiplier,
                max_interval: Duration::from_millis(*max_interval_ms),
            },
        };
        RetryPolicy {
            max_attempts: self.max_attempts,
            interval: Duration::from_millis(self.interval_ms),
            backoff,
        }
    }
}

fn default_providers() -> Vec<String> {
    ["grok4", "claude", "gpt4", "deepseek"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiCfg,
    /// HTTP client configuration (timeouts, pooling). Missing → defaults.
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub poll: PollCfg,
    /// Provider ids the caller may offer; the clients themselves never check membership.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiCfg::default(),
            http: HttpCfg::default(),
            poll: PollCfg::default(),
            providers: default_providers(),
        }
    }
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(ForgeError::from)?;
        let s =
            std::str::from_utf8(&bytes).map_err(|e| ForgeError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str::<Self>(s)
                .map_err(|e| ForgeError::Other(e.into()))?,
            Some("toml") => toml::from_str::<Self>(s)
                .map_err(|e| ForgeError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| ForgeError::Other(e.into()))
                .or_else(|_| {
                    toml::from_str::<Self>(s)
                        .map_err(|e| ForgeError::Other(e.into()))
                })?,
        };
        Ok(cfg)
    }

    pub fn is_known_provider(&self, id: &str) -> bool {
        self.providers.iter().any(|p| p == id)
    }
}
