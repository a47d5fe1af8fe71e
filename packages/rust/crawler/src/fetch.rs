//! HTTP page fetching.

use std::time::Duration;

use async_trait::async_trait;
use immoradar_shared::{ImmoRadarError, Result};
use reqwest::{Client, StatusCode};
use tracing::debug;

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("ImmoRadar/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 10;

/// A page body after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that served the body.
    pub final_url: String,
    pub body: String,
}

/// Fetches a single page. Anything other than HTTP 200 is an error.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// reqwest-backed [`PageFetcher`].
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| ImmoRadarError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        debug!(%url, "fetching page");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "fr-FR,fr;q=0.9,en;q=0.7")
            .send()
            .await
            .map_err(|e| ImmoRadarError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ImmoRadarError::Network(format!("{url}: HTTP {status}")));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ImmoRadarError::Network(format!("{url}: body read failed: {e}")))?;

        Ok(FetchedPage { final_url, body })
    }
}
