//! Shared types, error model, and configuration for ImmoRadar.
//!
//! This crate is the foundation depended on by all other ImmoRadar crates.
//! It provides:
//! - [`ImmoRadarError`], the unified error type
//! - Domain records ([`Website`], [`DiscoveredRelation`], [`RunId`] and the status enums)
//! - Configuration ([`AppConfig`], [`DiscoveryConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CertLogConfig, DiscoveryConfig, DiscoveryPolicyConfig, MAX_POLITENESS_DELAY_SECS,
    SearchConfig, StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_db_path, search_api_key,
};
pub use error::{ImmoRadarError, Result};
pub use types::{
    DEFAULT_CRAWL_BUDGET, DiscoveredRelation, RelationType, RunId, TechStack, ValidationStatus,
    Website, host_of,
};
