//! Priority frontier of candidate domains with a per-run visited set.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use tracing::trace;

use crate::normalize::normalize_domain;

/// Platforms that are never real-estate targets. Matched as substrings.
pub const BLACKLIST: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "youtube.com",
    "linkedin.com",
    "avito.ma",
    "wikipedia.org",
    "pinterest.com",
    "twitter.com",
    "google.com",
    "bing.com",
];

/// Domain fragments that suggest a real-estate site.
pub const DOMAIN_KEYWORDS: &[&str] = &[
    "immo",
    "immobilier",
    "property",
    "estate",
    "agence",
    "realestate",
];

/// Target country-code TLD.
pub const TARGET_TLD: &str = ".tn";

const BASE_PRIORITY: f64 = 10.0;
const KEYWORD_BOOST: f64 = 20.0;
const TLD_BOOST: f64 = 15.0;

/// A pending unit of discovery work.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTask {
    /// Higher is drained sooner.
    pub priority: f64,
    /// Canonical domain key.
    pub domain: String,
    /// Provenance label (`SerpAPI:<query>`, `crt.sh`, `Outbound:<domain>`).
    pub source: String,
    /// Expansion hops from a seed.
    pub depth: u32,
}

/// Result of [`Frontier::offer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Queued under this canonical key.
    Accepted(String),
    /// Could not be normalized.
    Invalid,
    Blacklisted(String),
    AlreadyVisited(String),
}

impl OfferOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Heap entry: priority first, then insertion order (earlier wins).
#[derive(Debug)]
struct Entry {
    seq: u64,
    task: CandidateTask,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.task
            .priority
            .total_cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Max-priority queue of [`CandidateTask`]s guarded by a visited set.
///
/// Every normalized domain ever offered lands in the visited set, so a
/// domain is dequeued at most once per run.
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<Entry>,
    visited: HashSet<String>,
    next_seq: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a URL. `priority = None` computes the default from the domain.
    pub fn offer(
        &mut self,
        url: &str,
        source: &str,
        priority: Option<f64>,
        depth: u32,
    ) -> OfferOutcome {
        let Some(domain) = normalize_domain(url) else {
            return OfferOutcome::Invalid;
        };

        if is_blacklisted(&domain) {
            self.visited.insert(domain.clone());
            return OfferOutcome::Blacklisted(domain);
        }

        if !self.visited.insert(domain.clone()) {
            return OfferOutcome::AlreadyVisited(domain);
        }

        let priority = priority.unwrap_or_else(|| default_priority(&domain));
        trace!(%domain, priority, depth, source, "frontier offer accepted");

        self.heap.push(Entry {
            seq: self.next_seq,
            task: CandidateTask {
                priority,
                domain: domain.clone(),
                source: source.to_string(),
                depth,
            },
        });
        self.next_seq += 1;

        OfferOutcome::Accepted(domain)
    }

    /// Remove and return the highest-priority task.
    pub fn pop(&mut self) -> Option<CandidateTask> {
        self.heap.pop().map(|entry| entry.task)
    }

    /// Record a domain as seen. Returns `false` if it already was.
    pub fn mark_visited(&mut self, domain: &str) -> bool {
        self.visited.insert(domain.to_string())
    }

    pub fn is_visited(&self, domain: &str) -> bool {
        self.visited.contains(domain)
    }

    /// Pending task count.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

pub fn is_blacklisted(domain: &str) -> bool {
    BLACKLIST.iter().any(|b| domain.contains(b))
}

/// Base priority, boosted for vertical keywords and the target TLD.
pub fn default_priority(domain: &str) -> f64 {
    let domain = domain.to_lowercase();
    let mut priority = BASE_PRIORITY;
    if DOMAIN_KEYWORDS.iter().any(|kw| domain.contains(kw)) {
        priority += KEYWORD_BOOST;
    }
    if domain.ends_with(TARGET_TLD) {
        priority += TLD_BOOST;
    }
    priority
}
