//! Application configuration for ImmoRadar.
//!
//! User config lives at `~/.immoradar/immoradar.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ImmoRadarError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "immoradar.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".immoradar";

/// Upper bound for `politeness_delay_secs`.
pub const MAX_POLITENESS_DELAY_SECS: f64 = 3600.0;

// ---------------------------------------------------------------------------
// Config structs (matching immoradar.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Discovery crawler tuning.
    #[serde(default)]
    pub discovery: DiscoveryPolicyConfig,

    /// Keyword search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Certificate-transparency log settings.
    #[serde(default)]
    pub cert_log: CertLogConfig,

    /// Database location.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryPolicyConfig {
    /// Maximum simultaneous in-flight validations.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// Hard timeout for a single page fetch.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Fixed wait before every fetch, per task.
    #[serde(default = "default_politeness_delay")]
    pub politeness_delay_secs: f64,

    /// Expansion ceiling: tasks at this depth never produce children.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Scores above this mark a new website `valid` instead of `needs_review`.
    #[serde(default = "default_valid_threshold")]
    pub valid_threshold: u8,

    /// Scores above this make a website's outbound links eligible for expansion.
    #[serde(default = "default_expand_threshold")]
    pub expand_threshold: u8,

    /// Pending-size floor below which the frontier is replenished from search.
    #[serde(default = "default_starvation_threshold")]
    pub starvation_threshold: usize,

    /// Upper bound on starvation-triggered search calls per run.
    #[serde(default = "default_max_replenishments")]
    pub max_replenishments: u32,

    /// Domain-suffix filter sent to the certificate log.
    #[serde(default = "default_cert_log_suffix")]
    pub cert_log_suffix: String,
}

impl Default for DiscoveryPolicyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: default_request_timeout(),
            politeness_delay_secs: default_politeness_delay(),
            max_depth: default_max_depth(),
            valid_threshold: default_valid_threshold(),
            expand_threshold: default_expand_threshold(),
            starvation_threshold: default_starvation_threshold(),
            max_replenishments: default_max_replenishments(),
            cert_log_suffix: default_cert_log_suffix(),
        }
    }
}

fn default_max_concurrency() -> u32 {
    10
}
fn default_request_timeout() -> u64 {
    15
}
fn default_politeness_delay() -> f64 {
    1.0
}
fn default_max_depth() -> u32 {
    3
}
fn default_valid_threshold() -> u8 {
    40
}
fn default_expand_threshold() -> u8 {
    50
}
fn default_starvation_threshold() -> usize {
    3
}
fn default_max_replenishments() -> u32 {
    25
}
fn default_cert_log_suffix() -> String {
    "%.tn".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Search API endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Country code used to localise results.
    #[serde(default = "default_country")]
    pub country: String,

    /// Result pages requested per query.
    #[serde(default = "default_pages_per_query")]
    pub pages_per_query: u32,

    /// Pause between result pages, in ms.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_search_endpoint(),
            country: default_country(),
            pages_per_query: default_pages_per_query(),
            page_delay_ms: default_page_delay(),
        }
    }
}

fn default_api_key_env() -> String {
    "SERPAPI_KEY".into()
}
fn default_search_endpoint() -> String {
    "https://serpapi.com/search.json".into()
}
fn default_country() -> String {
    "tn".into()
}
fn default_pages_per_query() -> u32 {
    3
}
fn default_page_delay() -> u64 {
    1000
}

/// `[cert_log]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertLogConfig {
    /// Certificate-transparency search endpoint.
    #[serde(default = "default_cert_log_endpoint")]
    pub endpoint: String,

    /// Request timeout; the log is slow for broad suffixes.
    #[serde(default = "default_cert_log_timeout")]
    pub timeout_secs: u64,
}

impl Default for CertLogConfig {
    fn default() -> Self {
        Self {
            endpoint: default_cert_log_endpoint(),
            timeout_secs: default_cert_log_timeout(),
        }
    }
}

fn default_cert_log_endpoint() -> String {
    "https://crt.sh/".into()
}
fn default_cert_log_timeout() -> u64 {
    30
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; a leading `~/` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    format!("~/{CONFIG_DIR_NAME}/immoradar.db")
}

// ---------------------------------------------------------------------------
// Discovery config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime discovery configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum simultaneous in-flight validations.
    pub max_concurrency: usize,
    /// Per-request hard timeout.
    pub request_timeout: Duration,
    /// Per-task pre-fetch delay.
    pub politeness_delay: Duration,
    /// Expansion ceiling.
    pub max_depth: u32,
    /// Cutoff for `valid` on first insert.
    pub valid_threshold: u8,
    /// Cutoff for outbound expansion.
    pub expand_threshold: u8,
    /// Frontier size that triggers replenishment.
    pub starvation_threshold: usize,
    /// Cap on starvation-triggered search calls.
    pub max_replenishments: u32,
    /// Certificate log suffix filter (e.g. `%.tn`).
    pub cert_log_suffix: String,
    /// Result pages per search query.
    pub search_pages: u32,
    /// Pause between result pages of one query.
    pub search_page_delay: Duration,
}

impl From<&AppConfig> for DiscoveryConfig {
    fn from(config: &AppConfig) -> Self {
        let d = &config.discovery;
        Self {
            max_concurrency: d.max_concurrency.max(1) as usize,
            request_timeout: Duration::from_secs(d.request_timeout_secs),
            politeness_delay: Duration::from_secs_f64(
                d.politeness_delay_secs.max(0.0).min(MAX_POLITENESS_DELAY_SECS),
            ),
            max_depth: d.max_depth,
            valid_threshold: d.valid_threshold.min(100),
            expand_threshold: d.expand_threshold.min(100),
            starvation_threshold: d.starvation_threshold,
            max_replenishments: d.max_replenishments,
            cert_log_suffix: d.cert_log_suffix.clone(),
            search_pages: config.search.pages_per_query,
            search_page_delay: Duration::from_millis(config.search.page_delay_ms),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.immoradar/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ImmoRadarError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.immoradar/immoradar.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ImmoRadarError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ImmoRadarError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Reject values the runtime config cannot represent.
    pub fn validate(&self) -> Result<()> {
        let delay = self.discovery.politeness_delay_secs;
        if !delay.is_finite() || !(0.0..=MAX_POLITENESS_DELAY_SECS).contains(&delay) {
            return Err(ImmoRadarError::config(format!(
                "discovery.politeness_delay_secs = {delay}: expected 0 to {MAX_POLITENESS_DELAY_SECS}"
            )));
        }
        Ok(())
    }
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ImmoRadarError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ImmoRadarError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ImmoRadarError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the search API key from the configured env var.
///
/// `None` means search is disabled for this run; callers treat it as a no-op
/// rather than an error.
pub fn search_api_key(config: &AppConfig) -> Option<String> {
    match std::env::var(&config.search.api_key_env) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

/// Resolve the database path, expanding a leading `~/`.
pub fn resolve_db_path(config: &AppConfig) -> Result<PathBuf> {
    let raw = config.storage.db_path.as_str();
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ImmoRadarError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}
