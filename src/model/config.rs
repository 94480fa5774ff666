use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub version: u32,

    /// Base URL of the resource gateway the default collaborators talk to.
    #[serde(default)]
    pub gateway_url: Option<String>,

    /// Regions offered by the region switcher.
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Where SSH keys are listed from. Defaults to `~/.ssh`.
    #[serde(default)]
    pub ssh_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            gateway_url: None,
            regions: default_regions(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            ssh_dir: None,
        }
    }
}

fn default_regions() -> Vec<String> {
    [
        "us-east-1",
        "us-east-2",
        "us-west-1",
        "us-west-2",
        "eu-west-1",
        "eu-central-1",
        "ap-southeast-1",
        "ap-northeast-1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a refreshed list stays fresh.
    pub ttl_secs: u64,
    /// Seconds an unsubscribed entry is kept before eviction.
    pub idle_evict_secs: u64,
    /// How often a visible list screen re-checks its entry, in milliseconds.
    pub recheck_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            idle_evict_secs: 300,
            recheck_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: u32,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 250,
            multiplier: 2,
            max_backoff_ms: 4000,
        }
    }
}

/// Process-wide defaults, persisted outside the vault.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    pub version: u32,

    #[serde(default)]
    pub context: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub ssh_key: Option<String>,

    /// Login name to suggest per ssh key.
    #[serde(default)]
    pub ssh_usernames: BTreeMap<String, String>,
}
