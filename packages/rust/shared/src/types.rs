//! Core domain records for ImmoRadar discovery.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ImmoRadarError;

/// Crawl budget given to a freshly discovered website.
pub const DEFAULT_CRAWL_BUDGET: u32 = 100;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for discovery run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// TechStack
// ---------------------------------------------------------------------------

/// Front-end technology fingerprinted from a site's root page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TechStack {
    #[default]
    Unknown,
    WordPress,
    NextJS,
    Vanilla,
}

impl TechStack {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::WordPress => "WordPress",
            Self::NextJS => "NextJS",
            Self::Vanilla => "Vanilla",
        }
    }
}

impl fmt::Display for TechStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TechStack {
    type Err = ImmoRadarError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Unknown" => Ok(Self::Unknown),
            "WordPress" => Ok(Self::WordPress),
            "NextJS" => Ok(Self::NextJS),
            "Vanilla" => Ok(Self::Vanilla),
            other => Err(ImmoRadarError::parse(format!("unknown tech stack: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationStatus
// ---------------------------------------------------------------------------

/// Review state of a discovered website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Valid,
    NeedsReview,
    Rejected,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Valid => "valid",
            Self::NeedsReview => "needs_review",
            Self::Rejected => "rejected",
        }
    }

    /// Status assigned to a never-seen domain on its first validation.
    pub fn for_new_score(score: u8, valid_threshold: u8) -> Self {
        if score > valid_threshold {
            Self::Valid
        } else {
            Self::NeedsReview
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = ImmoRadarError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "valid" => Ok(Self::Valid),
            "needs_review" => Ok(Self::NeedsReview),
            "rejected" => Ok(Self::Rejected),
            other => Err(ImmoRadarError::parse(format!(
                "unknown validation status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Website
// ---------------------------------------------------------------------------

/// A persisted candidate site, keyed by its canonical base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    /// Canonical `https://host` key.
    pub base_url: String,
    /// Display name (the bare host for discovered sites).
    pub name: String,
    /// Relevance score in `[0, 100]`; never lowered by rediscovery.
    pub confidence_score: u8,
    /// Provenance label of the task that first found the site.
    pub discovery_source: String,
    pub tech_stack: TechStack,
    pub validation_status: ValidationStatus,
    /// Hops from a seed; never raised by rediscovery.
    pub discovery_depth: u32,
    /// Trusted seed sites are active.
    pub is_active: bool,
    pub crawl_budget: u32,
    pub created_at: DateTime<Utc>,
    /// Last successful validation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl Website {
    /// Build a fresh record for a domain validated for the first time.
    pub fn discovered(
        base_url: impl Into<String>,
        score: u8,
        source: impl Into<String>,
        tech_stack: TechStack,
        depth: u32,
        valid_threshold: u8,
    ) -> Self {
        let base_url = base_url.into();
        let score = score.min(100);
        let now = Utc::now();
        Self {
            name: host_of(&base_url).to_string(),
            base_url,
            confidence_score: score,
            discovery_source: source.into(),
            tech_stack,
            validation_status: ValidationStatus::for_new_score(score, valid_threshold),
            discovery_depth: depth,
            is_active: false,
            crawl_budget: DEFAULT_CRAWL_BUDGET,
            created_at: now,
            last_validated_at: Some(now),
        }
    }
}

/// Strip the scheme from a canonical key.
pub fn host_of(base_url: &str) -> &str {
    base_url
        .split_once("://")
        .map(|(_, host)| host)
        .unwrap_or(base_url)
}

// ---------------------------------------------------------------------------
// DiscoveredRelation
// ---------------------------------------------------------------------------

/// Kind of evidence linking two domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Outbound,
    Backlink,
    SearchResult,
}

impl RelationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Backlink => "backlink",
            Self::SearchResult => "search_result",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = ImmoRadarError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "outbound" => Ok(Self::Outbound),
            "backlink" => Ok(Self::Backlink),
            "search_result" => Ok(Self::SearchResult),
            other => Err(ImmoRadarError::parse(format!(
                "unknown relation type: {other}"
            ))),
        }
    }
}

/// One observed edge in the link graph. Append-only, duplicates allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredRelation {
    pub source_domain: String,
    pub target_domain: String,
    pub relation_type: RelationType,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredRelation {
    pub fn outbound(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_domain: source.into(),
            target_domain: target.into(),
            relation_type: RelationType::Outbound,
            discovered_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrips_through_string() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_strings_match_storage_values() {
        assert_eq!(ValidationStatus::NeedsReview.as_str(), "needs_review");
        assert_eq!(
            "needs_review".parse::<ValidationStatus>().unwrap(),
            ValidationStatus::NeedsReview
        );
        assert!("approved".parse::<ValidationStatus>().is_err());
        assert_eq!("NextJS".parse::<TechStack>().unwrap(), TechStack::NextJS);
        assert_eq!(
            "search_result".parse::<RelationType>().unwrap(),
            RelationType::SearchResult
        );
    }

    #[test]
    fn new_status_uses_strict_threshold() {
        assert_eq!(
            ValidationStatus::for_new_score(41, 40),
            ValidationStatus::Valid
        );
        assert_eq!(
            ValidationStatus::for_new_score(40, 40),
            ValidationStatus::NeedsReview
        );
    }

    #[test]
    fn discovered_website_defaults() {
        let site = Website::discovered(
            "https://immo.tn",
            120,
            "SerpAPI:immobilier tunisie",
            TechStack::WordPress,
            1,
            40,
        );
        assert_eq!(site.name, "immo.tn");
        assert_eq!(site.confidence_score, 100);
        assert_eq!(site.validation_status, ValidationStatus::Valid);
        assert_eq!(site.crawl_budget, DEFAULT_CRAWL_BUDGET);
        assert!(!site.is_active);
        assert!(site.last_validated_at.is_some());
    }
}
