//! Seed provider clients for ImmoRadar discovery.
//!
//! Two independent sources of candidate domains feed the frontier:
//! a keyword search API ([`SerpApiClient`]) and a certificate-transparency
//! log ([`CrtShClient`]). Both sit behind traits so the orchestrator can be
//! driven by in-memory fakes in tests.
//!
//! Providers only return raw candidates. Normalization, blacklisting and
//! priority assignment belong to the frontier.

mod crtsh;
mod serpapi;

use std::time::Duration;

use async_trait::async_trait;
use immoradar_shared::{ImmoRadarError, Result};
use reqwest::Client;

pub use crtsh::CrtShClient;
pub use serpapi::SerpApiClient;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("ImmoRadar/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Provider records
// ---------------------------------------------------------------------------

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Result URL as returned by the API (not normalized).
    pub link: String,
}

/// One certificate-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertEntry {
    /// Certificate common name, possibly a wildcard (`*.example.tn`).
    pub common_name: String,
}

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// A paginated keyword search API.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Fetch one page (0-based) of organic results for `query`.
    ///
    /// An empty vector means the query is exhausted.
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchHit>>;

    /// Whether the provider is configured to make real calls.
    fn is_available(&self) -> bool {
        true
    }
}

/// A certificate-transparency log search.
#[async_trait]
pub trait CertLogProvider: Send + Sync {
    /// Return certificate entries whose names match `suffix_filter` (e.g. `%.tn`).
    async fn query(&self, suffix_filter: &str) -> Result<Vec<CertEntry>>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client for provider APIs.
fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ImmoRadarError::Network(format!("failed to build HTTP client: {e}")))
}
