//! Run statistics, persisted as the `stats_json` of a discovery run.

use immoradar_crawler::ValidationOutcome;
use immoradar_shared::RunId;
use serde::Serialize;

/// Counters for one discovery run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub run_id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Candidates accepted into the frontier by the initial seeding.
    pub seeds_accepted: usize,
    pub tasks_dispatched: usize,
    pub validated: usize,
    pub partial: usize,
    pub fetch_failures: usize,
    pub store_failures: usize,
    pub websites_inserted: usize,
    pub websites_updated: usize,
    /// Outbound domains offered back to the frontier.
    pub child_offers: usize,
    pub child_accepted: usize,
    /// Starvation-triggered search calls.
    pub replenishments: u32,
    pub replenished_accepted: usize,
    /// Distinct domains seen by the frontier.
    pub domains_seen: usize,
    pub duration_ms: u64,
}

impl DiscoveryReport {
    pub fn new(run_id: RunId, query: Option<&str>) -> Self {
        Self {
            run_id,
            query: query.map(str::to_string),
            ..Self::default()
        }
    }

    /// Tasks whose outcome has been absorbed.
    pub fn completed(&self) -> usize {
        self.validated + self.partial + self.fetch_failures + self.store_failures
    }

    pub(crate) fn record(&mut self, outcome: &ValidationOutcome) {
        match outcome {
            ValidationOutcome::Validated(_) => self.validated += 1,
            ValidationOutcome::Partial(_) => self.partial += 1,
            ValidationOutcome::FetchFailed { .. } => self.fetch_failures += 1,
            ValidationOutcome::StoreFailed { .. } => self.store_failures += 1,
        }
        if let Some(site) = outcome.site() {
            if site.inserted {
                self.websites_inserted += 1;
            } else {
                self.websites_updated += 1;
            }
        }
    }
}
