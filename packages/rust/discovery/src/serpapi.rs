//! SerpAPI-compatible search client.

use std::time::Duration;

use async_trait::async_trait;
use immoradar_shared::{ImmoRadarError, Result, SearchConfig};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{SearchHit, SearchProvider, build_client};

/// Results per page on the Google engine.
const RESULTS_PER_PAGE: u32 = 10;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: Option<String>,
}

/// Search client for a SerpAPI-style `search.json` endpoint.
///
/// Without an API key the client is a no-op that always returns no results.
pub struct SerpApiClient {
    client: Client,
    endpoint: String,
    country: String,
    api_key: Option<String>,
}

impl SerpApiClient {
    pub fn new(config: &SearchConfig, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(SEARCH_TIMEOUT)?,
            endpoint: config.endpoint.clone(),
            country: config.country.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    #[instrument(skip_all, fields(query = %query, page))]
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchHit>> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("no search API key configured, skipping");
            return Ok(Vec::new());
        };

        let start = (page * RESULTS_PER_PAGE).to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("api_key", api_key),
                ("gl", self.country.as_str()),
                ("start", start.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ImmoRadarError::provider(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImmoRadarError::provider(format!("search API: HTTP {status}")));
        }

        let body: SerpResponse = response
            .json()
            .await
            .map_err(|e| ImmoRadarError::provider(format!("search API: bad response: {e}")))?;

        if let Some(error) = body.error {
            // The API reports "no results" through the error field too.
            if error.to_lowercase().contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            return Err(ImmoRadarError::provider(format!("search API: {error}")));
        }

        let hits: Vec<SearchHit> = body
            .organic_results
            .into_iter()
            .filter_map(|r| r.link)
            .map(|link| SearchHit { link })
            .collect();

        debug!(hits = hits.len(), "search page fetched");
        Ok(hits)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}
