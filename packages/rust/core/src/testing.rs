//! In-memory providers and fetcher for orchestrator tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use immoradar_crawler::{FetchedPage, PageFetcher};
use immoradar_discovery::{CertEntry, CertLogProvider, SearchHit, SearchProvider};
use immoradar_shared::{ImmoRadarError, Result};
use immoradar_storage::Storage;
use tokio::time::Instant;
use uuid::Uuid;

pub(crate) async fn test_storage() -> Arc<Storage> {
    let tmp = std::env::temp_dir().join(format!("immoradar_core_{}.db", Uuid::now_v7()));
    Arc::new(Storage::open(&tmp).await.expect("open test db"))
}

/// Answers page 0 of any query from a fixed table.
#[derive(Default)]
pub(crate) struct FakeSearch {
    by_query: HashMap<String, Vec<String>>,
    fallback: Vec<String>,
    /// Every call returns one never-seen domain instead.
    fresh_per_call: bool,
    fail: bool,
    calls: AtomicUsize,
    pub queries: Mutex<Vec<(String, u32)>>,
}

impl FakeSearch {
    pub fn with(query: &str, links: &[&str]) -> Self {
        let mut fake = Self::default();
        fake.by_query
            .insert(query.to_string(), links.iter().map(|l| l.to_string()).collect());
        fake
    }

    pub fn fallback(mut self, links: &[&str]) -> Self {
        self.fallback = links.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn fresh_per_call() -> Self {
        Self {
            fresh_per_call: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|(q, _)| q.clone())
            .collect()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push((query.to_string(), page));
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ImmoRadarError::provider("search API: HTTP 429"));
        }
        if page > 0 {
            return Ok(Vec::new());
        }
        let links = if self.fresh_per_call {
            vec![format!("https://fresh-{n}.tn")]
        } else {
            self.by_query
                .get(query)
                .cloned()
                .unwrap_or_else(|| self.fallback.clone())
        };
        Ok(links.into_iter().map(|link| SearchHit { link }).collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeCertLog {
    names: Vec<String>,
    pub calls: AtomicUsize,
}

impl FakeCertLog {
    pub fn with(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CertLogProvider for FakeCertLog {
    async fn query(&self, _suffix_filter: &str) -> Result<Vec<CertEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .names
            .iter()
            .map(|n| CertEntry {
                common_name: n.clone(),
            })
            .collect())
    }
}

/// Serves canned bodies keyed by canonical domain; anything else is a 500.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    pages: HashMap<String, String>,
    pub hits: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn with(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(u, b)| (u.to_string(), b.to_string()))
                .collect(),
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
        match self.pages.get(url) {
            Some(body) => Ok(FetchedPage {
                final_url: format!("{url}/"),
                body: body.clone(),
            }),
            None => Err(ImmoRadarError::Network(format!("{url}: HTTP 500"))),
        }
    }
}

/// Spends `work` on every fetch and then fails it, tracking overlap.
pub(crate) struct TimedFetcher {
    work: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

impl TimedFetcher {
    pub fn new(work: Duration) -> Self {
        Self {
            work,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Most fetches ever running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Start time of every fetch, in call order.
    pub fn started(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for TimedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.started.lock().unwrap().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.work).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Err(ImmoRadarError::Network(format!("{url}: HTTP 503")))
    }
}
