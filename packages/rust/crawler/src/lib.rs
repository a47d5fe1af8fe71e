//! Discovery crawler: normalization, scoring, frontier, validation, and
//! per-site listing scrapers.
//!
//! This crate provides:
//! - [`normalize_domain`]: canonical `https://host` keys
//! - [`score_content`] / [`detect_tech_stack`]: the pure relevance scorer
//! - [`Frontier`]: priority queue of candidate domains with a visited set
//! - [`Validator`]: fetch, score, upsert and expand one candidate
//! - [`adapters`]: the [`SiteScraper`] interface and [`ScraperRegistry`] dispatch

pub mod adapters;
pub mod fetch;
pub mod frontier;
pub mod normalize;
pub mod scoring;
pub mod validator;

pub use adapters::{
    GenericScraper, ListingRecord, ProfileScraper, ScraperKind, ScraperRegistry, SiteProfile,
    SiteScraper, TransactionType,
};
pub use fetch::{FetchedPage, HttpFetcher, PageFetcher};
pub use frontier::{CandidateTask, Frontier, OfferOutcome, default_priority, is_blacklisted};
pub use normalize::{normalize_domain, normalize_link};
pub use scoring::{REGIONS, detect_tech_stack, score_content, visible_text};
pub use validator::{ValidatedSite, ValidationOutcome, Validator, ValidatorSettings};
