//! crt.sh-compatible certificate-transparency client.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use immoradar_shared::{CertLogConfig, ImmoRadarError, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{CertEntry, CertLogProvider, build_client};

#[derive(Debug, Deserialize)]
struct CrtRow {
    #[serde(default)]
    common_name: Option<String>,
}

/// Client for the crt.sh JSON output.
pub struct CrtShClient {
    client: Client,
    endpoint: String,
}

impl CrtShClient {
    pub fn new(config: &CertLogConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl CertLogProvider for CrtShClient {
    /// Returns each distinct common name once, in log order.
    #[instrument(skip_all, fields(suffix = %suffix_filter))]
    async fn query(&self, suffix_filter: &str) -> Result<Vec<CertEntry>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", suffix_filter), ("output", "json")])
            .send()
            .await
            .map_err(|e| ImmoRadarError::provider(format!("certificate log request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImmoRadarError::provider(format!(
                "certificate log: HTTP {status}"
            )));
        }

        let rows: Vec<CrtRow> = response.json().await.map_err(|e| {
            ImmoRadarError::provider(format!("certificate log: bad response: {e}"))
        })?;

        let mut seen = HashSet::new();
        let entries: Vec<CertEntry> = rows
            .into_iter()
            .filter_map(|row| row.common_name)
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .map(|common_name| CertEntry { common_name })
            .collect();

        debug!(entries = entries.len(), "certificate log queried");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> CertLogConfig {
        CertLogConfig {
            endpoint: format!("{}/", server.uri()),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn returns_distinct_common_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "%.tn"))
            .and(query_param("output", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[
                    {"issuer_name":"R3","common_name":"immo-sousse.tn"},
                    {"common_name":"*.agence.com.tn"},
                    {"common_name":"IMMO-SOUSSE.tn"},
                    {"name_value":"missing-cn.tn"}
                ]"#,
            ))
            .mount(&server)
            .await;

        let client = CrtShClient::new(&config_for(&server)).unwrap();
        let entries = client.query("%.tn").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.common_name.as_str()).collect();
        assert_eq!(names, vec!["immo-sousse.tn", "*.agence.com.tn"]);
    }

    #[tokio::test]
    async fn server_error_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = CrtShClient::new(&config_for(&server)).unwrap();
        let err = client.query("%.tn").await.unwrap_err();
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn non_json_body_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .mount(&server)
            .await;

        let client = CrtShClient::new(&config_for(&server)).unwrap();
        assert!(client.query("%.tn").await.is_err());
    }
}
