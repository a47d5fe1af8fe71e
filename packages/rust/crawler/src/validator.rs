//! Per-task validation and expansion.
//!
//! A [`Validator`] takes one [`CandidateTask`], fetches the domain's root
//! page, scores it, upserts the [`Website`] and, for promising pages below
//! the depth ceiling, records outbound edges and returns the child domains
//! for the caller to offer back to the frontier.
//!
//! Nothing in here returns `Err`: every failure is folded into a
//! [`ValidationOutcome`] so a single bad site never stops a run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use immoradar_shared::{
    DiscoveredRelation, DiscoveryConfig, TechStack, ValidationStatus, Website,
};
use immoradar_storage::Storage;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::fetch::PageFetcher;
use crate::frontier::CandidateTask;
use crate::normalize::{normalize_domain, normalize_link};
use crate::scoring::{detect_tech_stack, score_content, visible_text};

/// Knobs the validator reads from [`DiscoveryConfig`].
#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    pub politeness_delay: Duration,
    pub max_depth: u32,
    pub valid_threshold: u8,
    pub expand_threshold: u8,
}

impl From<&DiscoveryConfig> for ValidatorSettings {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            politeness_delay: config.politeness_delay,
            max_depth: config.max_depth,
            valid_threshold: config.valid_threshold,
            expand_threshold: config.expand_threshold,
        }
    }
}

/// What a successful validation produced.
#[derive(Debug, Clone)]
pub struct ValidatedSite {
    pub domain: String,
    pub depth: u32,
    /// Score of this fetch (the stored score may be higher).
    pub score: u8,
    pub tech_stack: TechStack,
    /// Status as stored after the upsert.
    pub status: ValidationStatus,
    /// `true` when this call created the record.
    pub inserted: bool,
    /// Distinct outbound domains to offer at `depth + 1`.
    pub children: Vec<String>,
    /// Edge inserts that failed. They never fail the task.
    pub relations_failed: usize,
}

/// Per-task result consumed by the orchestrator.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// Fetched, scored and persisted.
    Validated(ValidatedSite),
    /// Persisted, but the page had no visible text to score.
    Partial(ValidatedSite),
    /// Transport error, timeout or non-200. Nothing was persisted.
    FetchFailed { domain: String, error: String },
    /// The website upsert failed. No edges were recorded.
    StoreFailed { domain: String, error: String },
}

impl ValidationOutcome {
    pub fn domain(&self) -> &str {
        match self {
            Self::Validated(site) | Self::Partial(site) => &site.domain,
            Self::FetchFailed { domain, .. } | Self::StoreFailed { domain, .. } => domain,
        }
    }

    /// Child domains to offer, empty unless validation succeeded.
    pub fn children(&self) -> &[String] {
        match self {
            Self::Validated(site) | Self::Partial(site) => &site.children,
            _ => &[],
        }
    }

    pub fn site(&self) -> Option<&ValidatedSite> {
        match self {
            Self::Validated(site) | Self::Partial(site) => Some(site),
            _ => None,
        }
    }
}

/// Fetch-score-persist-expand for single frontier tasks.
///
/// The caller is responsible for the concurrency bound and for marking the
/// task's domain visited before handing it over.
pub struct Validator {
    fetcher: Arc<dyn PageFetcher>,
    storage: Arc<Storage>,
    settings: ValidatorSettings,
}

impl Validator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        storage: Arc<Storage>,
        settings: ValidatorSettings,
    ) -> Self {
        Self {
            fetcher,
            storage,
            settings,
        }
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    #[instrument(skip_all, fields(domain = %task.domain, depth = task.depth))]
    pub async fn validate(&self, task: &CandidateTask) -> ValidationOutcome {
        if !self.settings.politeness_delay.is_zero() {
            tokio::time::sleep(self.settings.politeness_delay).await;
        }

        let page = match self.fetcher.fetch(&task.domain).await {
            Ok(page) => page,
            Err(e) => {
                debug!(error = %e, "fetch failed");
                return ValidationOutcome::FetchFailed {
                    domain: task.domain.clone(),
                    error: e.to_string(),
                };
            }
        };

        let may_expand = task.depth < self.settings.max_depth;
        let analysis = analyze(&page.body, &page.final_url, &task.domain, may_expand);

        let record = Website::discovered(
            task.domain.as_str(),
            analysis.score,
            task.source.as_str(),
            analysis.tech_stack,
            task.depth,
            self.settings.valid_threshold,
        );

        let stored = match self
            .storage
            .upsert_website(&record, self.settings.valid_threshold)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "failed to store website");
                return ValidationOutcome::StoreFailed {
                    domain: task.domain.clone(),
                    error: e.to_string(),
                };
            }
        };

        let children = if may_expand && analysis.score > self.settings.expand_threshold {
            analysis.outbound
        } else {
            Vec::new()
        };

        let mut relations_failed = 0;
        for target in &children {
            let edge = DiscoveredRelation::outbound(task.domain.as_str(), target.as_str());
            if let Err(e) = self.storage.insert_relation(&edge).await {
                debug!(target = %target, error = %e, "failed to record relation");
                relations_failed += 1;
            }
        }

        info!(
            score = analysis.score,
            tech = %analysis.tech_stack,
            status = %stored.website.validation_status,
            inserted = stored.inserted,
            children = children.len(),
            "validated"
        );

        let site = ValidatedSite {
            domain: task.domain.clone(),
            depth: task.depth,
            score: analysis.score,
            tech_stack: analysis.tech_stack,
            status: stored.website.validation_status,
            inserted: stored.inserted,
            children,
            relations_failed,
        };

        if analysis.text_empty {
            ValidationOutcome::Partial(site)
        } else {
            ValidationOutcome::Validated(site)
        }
    }
}

// ---------------------------------------------------------------------------
// Page analysis
// ---------------------------------------------------------------------------

struct PageAnalysis {
    text_empty: bool,
    score: u8,
    tech_stack: TechStack,
    /// Distinct canonical domains linked from the page, excluding `own_domain`
    /// and the host the fetch landed on.
    outbound: Vec<String>,
}

/// Parse once and derive everything the validator needs.
///
/// Kept synchronous: `scraper::Html` is not `Send` and must not live across
/// an await point.
fn analyze(body: &str, final_url: &str, own_domain: &str, collect_links: bool) -> PageAnalysis {
    let doc = Html::parse_document(body);
    let text = visible_text(&doc);

    let outbound = match (collect_links, Url::parse(final_url)) {
        (true, Ok(base)) => {
            // After a cross-host redirect the page links to its landing host.
            let landed = normalize_domain(final_url);
            let own: Vec<&str> = std::iter::once(own_domain)
                .chain(landed.as_deref())
                .collect();
            outbound_domains(&doc, &base, &own)
        }
        _ => Vec::new(),
    };

    PageAnalysis {
        text_empty: text.trim().is_empty(),
        score: score_content(&text),
        tech_stack: detect_tech_stack(body),
        outbound,
    }
}

/// Canonical domains of every `a[href]`, first-seen order, minus `own`.
fn outbound_domains(doc: &Html, base: &Url, own: &[&str]) -> Vec<String> {
    let Ok(link_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    doc.select(&link_sel)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| normalize_link(base, href))
        .filter(|domain| !own.contains(&domain.as_str()) && seen.insert(domain.clone()))
        .collect()
}
