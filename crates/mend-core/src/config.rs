//! Configuration management for Mend
//!
//! Loaded from `.mend/config.toml` in the harness root. Every section has
//! serde defaults so a missing or partial file still yields a usable
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;

/// Harness-level Mend configuration
///
/// Loaded from `.mend/config.toml` under the harness root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MendConfig {
    /// Path to the persisted reliability model
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Path to the change-cache file holding the last-seen revision marker
    #[serde(default = "default_change_cache_path")]
    pub change_cache_path: PathBuf,

    /// Path to the path -> modification-time side map for the no-VCS fallback
    #[serde(default = "default_mtime_cache_path")]
    pub mtime_cache_path: PathBuf,

    /// Healing cascade tuning
    #[serde(default)]
    pub cascade: CascadeConfig,

    /// Execution planner defaults
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Semantic service client tuning
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Timeouts and caps for the healing cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Visibility wait for the direct-retry step, in milliseconds
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,

    /// Per-candidate visibility probe timeout, in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Maximum snapshot elements described to the semantic service
    #[serde(default = "default_max_snapshot_elements")]
    pub max_snapshot_elements: usize,
}

/// Default filters for execution planning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Tests below this priority are skipped
    #[serde(default)]
    pub min_priority: u32,

    /// Skip tests whose stability falls below `min_stability`
    #[serde(default)]
    pub skip_flaky: bool,

    /// Stability threshold applied when `skip_flaky` is set
    #[serde(default = "default_min_stability")]
    pub min_stability: f64,
}

/// Semantic service client tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Messages endpoint URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum completion tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Minimum enforced delay between successive calls, in milliseconds
    #[serde(default = "default_min_call_interval_ms")]
    pub min_call_interval_ms: u64,

    /// Maximum retry attempts on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in seconds (doubles per retry, capped)
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    /// Backoff ceiling in seconds
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Consecutive failures before the circuit opens
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// Seconds before an open circuit half-opens
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
}

// Default value providers
fn default_model_path() -> PathBuf {
    PathBuf::from(".mend/model.json")
}

fn default_change_cache_path() -> PathBuf {
    PathBuf::from(".mend/change-cache.json")
}

fn default_mtime_cache_path() -> PathBuf {
    PathBuf::from(".mend/mtime-cache.json")
}

fn default_retry_wait_ms() -> u64 {
    500
}

fn default_probe_timeout_ms() -> u64 {
    250
}

fn default_max_snapshot_elements() -> usize {
    20
}

fn default_min_stability() -> f64 {
    0.3
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_tokens() -> usize {
    4096
}

fn default_min_call_interval_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_breaker_threshold() -> u32 {
    3
}

fn default_breaker_cooldown_secs() -> u64 {
    60
}

impl MendConfig {
    /// Load configuration from `.mend/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".mend/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&content).map_err(|e| {
                crate::MendError::Config(format!("Failed to parse config file: {}", e))
            })?)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.mend/config.toml`
    pub fn write_default(root: &Path) -> Result<()> {
        let config_dir = root.join(".mend");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| crate::MendError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

impl Default for MendConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            change_cache_path: default_change_cache_path(),
            mtime_cache_path: default_mtime_cache_path(),
            cascade: CascadeConfig::default(),
            planner: PlannerConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            retry_wait_ms: default_retry_wait_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_snapshot_elements: default_max_snapshot_elements(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_priority: 0,
            skip_flaky: false,
            min_stability: default_min_stability(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            min_call_interval_ms: default_min_call_interval_ms(),
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            breaker_threshold: default_breaker_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
        }
    }
}
