//! Discovery orchestrator: seed, drain, replenish.
//!
//! One orchestrator loop owns the [`Frontier`]. Validations run as spawned
//! tasks bounded by a semaphore; their outcomes come back through a
//! [`JoinSet`] and child domains are offered to the frontier from the loop,
//! so the frontier and visited set have a single writer.

use std::sync::Arc;
use std::time::Instant;

use immoradar_crawler::{Frontier, PageFetcher, ValidationOutcome, Validator, ValidatorSettings};
use immoradar_discovery::{CertLogProvider, SearchProvider};
use immoradar_shared::{DiscoveryConfig, Result, RunId};
use immoradar_storage::Storage;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::progress::DiscoveryProgress;
use crate::report::DiscoveryReport;
use crate::seeding::{GENERIC_QUERIES, region_query, seed_from_cert_log, seed_from_search};

/// Mutable state of one run, owned by the orchestrator loop.
struct RunState {
    frontier: Frontier,
    report: DiscoveryReport,
}

/// Drives discovery runs against a storage handle and a set of providers.
pub struct Orchestrator {
    config: DiscoveryConfig,
    storage: Arc<Storage>,
    search: Arc<dyn SearchProvider>,
    cert_log: Arc<dyn CertLogProvider>,
    validator: Arc<Validator>,
}

impl Orchestrator {
    pub fn new(
        config: DiscoveryConfig,
        storage: Arc<Storage>,
        search: Arc<dyn SearchProvider>,
        cert_log: Arc<dyn CertLogProvider>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let validator = Arc::new(Validator::new(
            fetcher,
            storage.clone(),
            ValidatorSettings::from(&config),
        ));
        Self {
            config,
            storage,
            search,
            cert_log,
            validator,
        }
    }

    /// Run one discovery pass to frontier exhaustion.
    ///
    /// `query` restricts seeding to that single search query; `None` seeds
    /// from the certificate log and the generic queries. Only failing to
    /// create the run record returns `Err`.
    #[instrument(skip_all, fields(query = query.unwrap_or("<generic>")))]
    pub async fn run(
        &self,
        query: Option<&str>,
        progress: &dyn DiscoveryProgress,
    ) -> Result<DiscoveryReport> {
        let started = Instant::now();
        let run_id = RunId::new();
        self.storage.insert_discovery_run(&run_id, query).await?;

        let mut state = RunState {
            frontier: Frontier::new(),
            report: DiscoveryReport::new(run_id, query),
        };

        info!(
            %run_id,
            max_concurrency = self.config.max_concurrency,
            max_depth = self.config.max_depth,
            search = self.search.is_available(),
            "starting discovery run"
        );

        progress.phase("seeding");
        state.report.seeds_accepted = self.seed(query, &mut state.frontier).await;

        progress.phase("validating");
        self.drain(&mut state, progress).await;

        state.report.domains_seen = state.frontier.visited_count();
        state.report.duration_ms = started.elapsed().as_millis() as u64;

        match serde_json::to_string(&state.report) {
            Ok(stats) => {
                if let Err(e) = self.storage.finish_discovery_run(&run_id, &stats).await {
                    warn!(error = %e, "failed to record run stats");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize run stats"),
        }

        info!(
            dispatched = state.report.tasks_dispatched,
            validated = state.report.validated,
            inserted = state.report.websites_inserted,
            fetch_failures = state.report.fetch_failures,
            replenishments = state.report.replenishments,
            duration_ms = state.report.duration_ms,
            "discovery run completed"
        );

        progress.done(&state.report);
        Ok(state.report)
    }

    async fn seed(&self, query: Option<&str>, frontier: &mut Frontier) -> usize {
        let mut accepted = 0;
        let queries: Vec<&str> = match query {
            Some(q) => vec![q],
            None => {
                accepted += seed_from_cert_log(
                    self.cert_log.as_ref(),
                    frontier,
                    &self.config.cert_log_suffix,
                )
                .await;
                GENERIC_QUERIES.to_vec()
            }
        };

        for q in queries {
            accepted += self.search_into(frontier, q).await;
        }
        accepted
    }

    async fn search_into(&self, frontier: &mut Frontier, query: &str) -> usize {
        seed_from_search(
            self.search.as_ref(),
            frontier,
            query,
            self.config.search_pages,
            self.config.search_page_delay,
        )
        .await
    }

    /// Pop, dispatch and absorb until nothing is pending or in flight.
    async fn drain(&self, state: &mut RunState, progress: &dyn DiscoveryProgress) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut in_flight: JoinSet<ValidationOutcome> = JoinSet::new();

        loop {
            if state.frontier.is_empty() {
                match in_flight.join_next().await {
                    Some(joined) => {
                        self.absorb(state, joined, progress);
                        continue;
                    }
                    None => break,
                }
            }

            // Wait for a slot by reaping a finished task, so its children
            // compete with what is already queued.
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    if let Some(joined) = in_flight.join_next().await {
                        self.absorb(state, joined, progress);
                    }
                    continue;
                }
            };

            let Some(task) = state.frontier.pop() else {
                continue;
            };
            state.frontier.mark_visited(&task.domain);
            state.report.tasks_dispatched += 1;
            progress.task_started(&task.domain, state.frontier.len());
            debug!(domain = %task.domain, priority = task.priority, depth = task.depth, "dispatching");

            if state.frontier.len() < self.config.starvation_threshold {
                self.replenish(state).await;
            }

            let validator = self.validator.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                validator.validate(&task).await
            });
        }
    }

    /// Starvation guard: one region query, bounded per run.
    async fn replenish(&self, state: &mut RunState) {
        if !self.search.is_available() {
            return;
        }
        if state.report.replenishments >= self.config.max_replenishments {
            debug!("replenishment budget exhausted");
            return;
        }

        state.report.replenishments += 1;
        let query = region_query();
        debug!(%query, pending = state.frontier.len(), "frontier starving, replenishing");
        state.report.replenished_accepted += self.search_into(&mut state.frontier, &query).await;
    }

    fn absorb(
        &self,
        state: &mut RunState,
        joined: std::result::Result<ValidationOutcome, JoinError>,
        progress: &dyn DiscoveryProgress,
    ) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "validation task aborted");
                return;
            }
        };

        match &outcome {
            ValidationOutcome::FetchFailed { domain, error } => {
                debug!(%domain, %error, "not validated");
            }
            ValidationOutcome::StoreFailed { domain, error } => {
                warn!(%domain, %error, "validation dropped");
            }
            _ => {}
        }

        state.report.record(&outcome);

        if let Some(site) = outcome.site() {
            let source = format!("Outbound:{}", site.domain);
            let child_depth = site.depth + 1;
            for child in &site.children {
                state.report.child_offers += 1;
                if state
                    .frontier
                    .offer(child, &source, None, child_depth)
                    .is_accepted()
                {
                    state.report.child_accepted += 1;
                }
            }
        }

        progress.task_finished(&outcome, state.report.completed());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use immoradar_shared::ValidationStatus;

    use super::*;
    use crate::progress::SilentProgress;
    use crate::testing::{FakeCertLog, FakeFetcher, FakeSearch, TimedFetcher, test_storage};

    const RICH_PAGE: &str = "<html><body><h1>Agence immobilière à Tunis</h1>\
        <p>Appartement, villa et maison en vente ou location. 250 000 DT.</p></body></html>";

    fn quiet_config() -> DiscoveryConfig {
        DiscoveryConfig {
            max_concurrency: 4,
            politeness_delay: Duration::ZERO,
            starvation_threshold: 0,
            max_replenishments: 0,
            search_pages: 2,
            search_page_delay: Duration::ZERO,
            ..DiscoveryConfig::default()
        }
    }

    fn linking_page(target: &str) -> String {
        format!(
            "<html><body><p>Agence immobilière: appartement, villa, maison. 120 000 DT</p>\
             <a href=\"{target}/annonce/1\">voir</a></body></html>"
        )
    }

    struct Harness {
        storage: Arc<Storage>,
        search: Arc<FakeSearch>,
        certs: Arc<FakeCertLog>,
        fetcher: Arc<FakeFetcher>,
    }

    impl Harness {
        async fn new(search: FakeSearch, certs: FakeCertLog, fetcher: FakeFetcher) -> Self {
            Self {
                storage: test_storage().await,
                search: Arc::new(search),
                certs: Arc::new(certs),
                fetcher: Arc::new(fetcher),
            }
        }

        async fn run(&self, config: DiscoveryConfig, query: Option<&str>) -> DiscoveryReport {
            let orchestrator = Orchestrator::new(
                config,
                self.storage.clone(),
                self.search.clone(),
                self.certs.clone(),
                self.fetcher.clone(),
            );
            orchestrator.run(query, &SilentProgress).await.unwrap()
        }
    }

    #[tokio::test]
    async fn blacklisted_results_are_never_fetched() {
        let h = Harness::new(
            FakeSearch::with(
                "immobilier sfax",
                &[
                    "https://www.immo-sfax.tn/annonces",
                    "https://www.facebook.com/immo",
                    "https://instagram.com/immo",
                ],
            ),
            FakeCertLog::default(),
            FakeFetcher::with(&[("https://immo-sfax.tn", RICH_PAGE)]),
        )
        .await;

        let report = h.run(quiet_config(), Some("immobilier sfax")).await;
        assert_eq!(report.seeds_accepted, 1);
        assert_eq!(report.tasks_dispatched, 1);
        assert_eq!(report.validated, 1);
        assert_eq!(report.websites_inserted, 1);

        let sites = h.storage.list_websites(0).await.unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].base_url, "https://immo-sfax.tn");
        assert_eq!(sites[0].validation_status, ValidationStatus::Valid);
        assert_eq!(sites[0].discovery_source, "SerpAPI:immobilier sfax");
        assert_eq!(h.fetcher.hits("https://facebook.com"), 0);
    }

    #[tokio::test]
    async fn failed_fetch_stores_nothing_and_is_not_retried() {
        let h = Harness::new(
            FakeSearch::default().fallback(&["https://dead-immo.tn"]),
            FakeCertLog::default(),
            FakeFetcher::default(),
        )
        .await;

        let config = DiscoveryConfig {
            starvation_threshold: 10,
            max_replenishments: 3,
            ..quiet_config()
        };
        let report = h.run(config, Some("q")).await;

        assert_eq!(report.tasks_dispatched, 1);
        assert_eq!(report.fetch_failures, 1);
        assert!(report.replenishments >= 1);
        assert_eq!(h.fetcher.hits("https://dead-immo.tn"), 1);
        assert!(h.storage.list_websites(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expansion_stops_at_max_depth() {
        let page_a = linking_page("https://www.b-immo.tn");
        let page_b = linking_page("https://c-immo.tn");
        let h = Harness::new(
            FakeSearch::with("q", &["https://a-immo.tn"]),
            FakeCertLog::default(),
            FakeFetcher::with(&[
                ("https://a-immo.tn", page_a.as_str()),
                ("https://b-immo.tn", page_b.as_str()),
                ("https://c-immo.tn", RICH_PAGE),
            ]),
        )
        .await;

        let config = DiscoveryConfig {
            max_depth: 1,
            ..quiet_config()
        };
        let report = h.run(config, Some("q")).await;

        assert_eq!(report.tasks_dispatched, 2);
        assert_eq!(report.child_accepted, 1);
        assert_eq!(h.fetcher.hits("https://c-immo.tn"), 0);

        let b = h.storage.find_website("https://b-immo.tn").await.unwrap().unwrap();
        assert_eq!(b.discovery_depth, 1);
        assert_eq!(b.discovery_source, "Outbound:https://a-immo.tn");

        let edges = h.storage.list_relations_from("https://a-immo.tn").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_domain, "https://b-immo.tn");
        assert!(h.storage.list_relations_from("https://b-immo.tn").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unrestricted_run_uses_cert_log_and_generic_queries() {
        let h = Harness::new(
            FakeSearch::default(),
            FakeCertLog::with(&["*.immo-nabeul.tn"]),
            FakeFetcher::default(),
        )
        .await;

        let report = h.run(quiet_config(), None).await;

        assert_eq!(h.certs.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        let queries = h.search.queries();
        for q in GENERIC_QUERIES {
            assert!(queries.iter().any(|seen| seen == *q), "missing query {q}");
        }
        assert_eq!(report.seeds_accepted, 1);
        assert_eq!(h.fetcher.hits("https://immo-nabeul.tn"), 1);
    }

    #[tokio::test]
    async fn custom_query_skips_cert_log() {
        let h = Harness::new(
            FakeSearch::with("villa sousse", &["https://villa-sousse.tn"]),
            FakeCertLog::with(&["immo-nabeul.tn"]),
            FakeFetcher::default(),
        )
        .await;

        let report = h.run(quiet_config(), Some("villa sousse")).await;

        assert_eq!(h.certs.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(h.search.queries().iter().all(|q| q == "villa sousse"));
        assert_eq!(report.query.as_deref(), Some("villa sousse"));
        assert_eq!(h.fetcher.hits("https://immo-nabeul.tn"), 0);
    }

    #[tokio::test]
    async fn replenishment_is_capped() {
        let h = Harness::new(
            FakeSearch::fresh_per_call(),
            FakeCertLog::default(),
            FakeFetcher::default(),
        )
        .await;

        let config = DiscoveryConfig {
            max_concurrency: 1,
            starvation_threshold: 100,
            max_replenishments: 2,
            ..quiet_config()
        };
        let report = h.run(config, Some("q")).await;

        assert_eq!(report.replenishments, 2);
        assert_eq!(report.replenished_accepted, 2);
        assert_eq!(report.tasks_dispatched, 3);
        assert_eq!(report.fetch_failures, 3);
    }

    #[tokio::test]
    async fn failing_search_yields_an_empty_run() {
        let h = Harness::new(
            FakeSearch::failing(),
            FakeCertLog::default(),
            FakeFetcher::default(),
        )
        .await;

        let config = DiscoveryConfig {
            starvation_threshold: 100,
            max_replenishments: 5,
            ..quiet_config()
        };
        let report = h.run(config, Some("q")).await;

        assert_eq!(report.tasks_dispatched, 0);
        assert_eq!(report.replenishments, 0);
    }

    fn many_seeds(n: usize) -> FakeSearch {
        let links: Vec<String> = (0..n).map(|i| format!("https://immo-{i}.tn")).collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        FakeSearch::with("q", &refs)
    }

    async fn run_with(
        fetcher: Arc<TimedFetcher>,
        search: FakeSearch,
        config: DiscoveryConfig,
    ) -> DiscoveryReport {
        let orchestrator = Orchestrator::new(
            config,
            test_storage().await,
            Arc::new(search),
            Arc::new(FakeCertLog::default()),
            fetcher,
        );
        tokio::time::pause();
        orchestrator.run(Some("q"), &SilentProgress).await.unwrap()
    }

    #[tokio::test]
    async fn in_flight_validations_never_exceed_max_concurrency() {
        let fetcher = Arc::new(TimedFetcher::new(Duration::from_millis(50)));
        let config = DiscoveryConfig {
            max_concurrency: 3,
            ..quiet_config()
        };

        let report = run_with(fetcher.clone(), many_seeds(20), config).await;

        assert_eq!(report.tasks_dispatched, 20);
        assert_eq!(report.fetch_failures, 20);
        assert_eq!(fetcher.peak(), 3);
    }

    #[tokio::test]
    async fn politeness_delay_is_spent_holding_a_slot() {
        let fetcher = Arc::new(TimedFetcher::new(Duration::ZERO));
        let delay = Duration::from_secs(2);
        let config = DiscoveryConfig {
            max_concurrency: 1,
            politeness_delay: delay,
            ..quiet_config()
        };

        let report = run_with(fetcher.clone(), many_seeds(3), config).await;
        assert_eq!(report.tasks_dispatched, 3);

        // With one slot, each delay starts only after the previous fetch.
        let started = fetcher.started();
        assert_eq!(started.len(), 3);
        for pair in started.windows(2) {
            assert!(pair[1] - pair[0] >= delay);
        }
    }

    #[tokio::test]
    async fn run_record_is_finished_with_stats() {
        let h = Harness::new(
            FakeSearch::with("q", &["https://immo-sfax.tn"]),
            FakeCertLog::default(),
            FakeFetcher::with(&[("https://immo-sfax.tn", RICH_PAGE)]),
        )
        .await;

        let report = h.run(quiet_config(), Some("q")).await;
        let record = h
            .storage
            .get_discovery_run(&report.run_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.query.as_deref(), Some("q"));
        assert!(record.finished_at.is_some());
        let stats: serde_json::Value =
            serde_json::from_str(record.stats_json.as_deref().unwrap()).unwrap();
        assert_eq!(stats["validated"], 1);
        assert_eq!(stats["domains_seen"], 1);
    }
}
