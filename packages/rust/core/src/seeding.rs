//! Feeding the frontier from the seed providers.
//!
//! Provider failures end that seeding call early and are logged; they are
//! never returned to the caller.

use std::time::Duration;

use immoradar_crawler::{Frontier, REGIONS};
use immoradar_discovery::{CertLogProvider, SearchProvider};
use tracing::{debug, info, instrument, warn};

/// Fixed priority for search results: above cert-log noise, below boosted domains.
pub const SEARCH_PRIORITY: f64 = 5.0;

pub const CERT_LOG_PRIORITY: f64 = 3.0;

pub const CERT_LOG_SOURCE: &str = "crt.sh";

/// Queries used for an unrestricted run.
pub const GENERIC_QUERIES: &[&str] = &[
    "immobilier tunisie",
    "vente appartement tunis",
    "location maison tunisie",
];

/// A region-specific query for the starvation guard.
pub fn region_query() -> String {
    let region = REGIONS[fastrand::usize(..REGIONS.len())];
    format!("agence immobilière {region}")
}

pub fn search_source(query: &str) -> String {
    format!("SerpAPI:{query}")
}

/// Offer up to `pages` pages of results for `query`. Returns accepted offers.
#[instrument(skip_all, fields(query = %query))]
pub async fn seed_from_search(
    provider: &dyn SearchProvider,
    frontier: &mut Frontier,
    query: &str,
    pages: u32,
    page_delay: Duration,
) -> usize {
    if !provider.is_available() {
        debug!("search provider unavailable, skipping");
        return 0;
    }

    let source = search_source(query);
    let mut accepted = 0;

    for page in 0..pages {
        let hits = match provider.search(query, page).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(page, error = %e, "search failed");
                break;
            }
        };
        if hits.is_empty() {
            break;
        }

        for hit in &hits {
            if frontier
                .offer(&hit.link, &source, Some(SEARCH_PRIORITY), 0)
                .is_accepted()
            {
                accepted += 1;
            }
        }

        if page + 1 < pages && !page_delay.is_zero() {
            tokio::time::sleep(page_delay).await;
        }
    }

    info!(accepted, "search seeding done");
    accepted
}

/// Offer every certificate common name for `suffix_filter`. Returns accepted offers.
#[instrument(skip_all, fields(suffix = %suffix_filter))]
pub async fn seed_from_cert_log(
    provider: &dyn CertLogProvider,
    frontier: &mut Frontier,
    suffix_filter: &str,
) -> usize {
    let entries = match provider.query(suffix_filter).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "certificate log query failed");
            return 0;
        }
    };

    let accepted = entries
        .iter()
        .map(|entry| entry.common_name.trim_start_matches("*."))
        .filter(|name| {
            frontier
                .offer(&format!("https://{name}"), CERT_LOG_SOURCE, Some(CERT_LOG_PRIORITY), 0)
                .is_accepted()
        })
        .count();

    info!(entries = entries.len(), accepted, "certificate log seeding done");
    accepted
}
