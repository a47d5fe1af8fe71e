//! Per-site listing scrapers and the dispatch table that picks one.
//!
//! Discovery produces [`Website`](immoradar_shared::Website) records; a
//! downstream scraping step asks [`ScraperRegistry::select`] for the
//! adapter matching a site's base URL. Known portals get a selector
//! profile, everything else falls back to [`GenericScraper`].

mod generic;
mod profile;

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use immoradar_shared::{ImmoRadarError, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::fetch::PageFetcher;
use crate::normalize::normalize_domain;
use crate::scoring::REGIONS;

pub use generic::GenericScraper;
pub use profile::{MENZILI, MUBAWAB, ProfileScraper, SiteProfile};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Rent or sale, inferred from listing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Rent,
    Sale,
    #[default]
    Unknown,
}

/// One property listing, best-effort.
#[derive(Debug, Clone, Serialize)]
pub struct ListingRecord {
    pub url: String,
    pub title: Option<String>,
    /// Price in TND.
    pub price: Option<f64>,
    /// First region named on the page.
    pub city: Option<String>,
    pub surface_m2: Option<u32>,
    pub rooms: Option<u32>,
    pub transaction: TransactionType,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
    /// SHA-256 over title, price, surface and URL.
    pub content_hash: String,
}

impl ListingRecord {
    pub(crate) fn finish(mut self) -> Self {
        self.content_hash = listing_hash(
            self.title.as_deref(),
            self.price,
            self.surface_m2,
            &self.url,
        );
        self
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Capability interface of a per-site scraper.
///
/// Fetch errors yield empty lists or `None`; missing elements yield empty
/// fields. Implementations never fail a whole site over one page.
#[async_trait]
pub trait SiteScraper: Send + Sync {
    /// Adapter name for logs and `immoradar sites`.
    fn name(&self) -> &str;

    /// Category pages to start from.
    async fn list_entry_pages(&self) -> Vec<String>;

    /// Listing detail URLs found from one category page.
    async fn extract_listing_links(&self, page_url: &str) -> Vec<String>;

    /// Extract one listing. `None` if the page could not be fetched.
    async fn extract_listing_data(&self, listing_url: &str) -> Option<ListingRecord>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Which adapter a base URL maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScraperKind {
    Profile(&'static SiteProfile),
    Generic,
}

impl ScraperKind {
    /// Dispatch on the canonical domain. Unknown or unparsable URLs are generic.
    pub fn for_base_url(base_url: &str) -> Self {
        let Some(domain) = normalize_domain(base_url) else {
            return Self::Generic;
        };
        let host = immoradar_shared::host_of(&domain);
        [&MUBAWAB, &MENZILI]
            .into_iter()
            .find(|p| host == p.domain || host.ends_with(&format!(".{}", p.domain)))
            .map_or(Self::Generic, Self::Profile)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Profile(profile) => profile.name,
            Self::Generic => GenericScraper::NAME,
        }
    }
}

/// Builds the scraper for a validated site.
pub struct ScraperRegistry {
    fetcher: Arc<dyn PageFetcher>,
}

impl ScraperRegistry {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Always returns a scraper; the generic one is the fallback.
    pub fn select(&self, base_url: &str) -> Result<Box<dyn SiteScraper>> {
        let base = Url::parse(base_url)
            .map_err(|e| ImmoRadarError::validation(format!("bad base URL {base_url}: {e}")))?;
        let fetcher = self.fetcher.clone();
        Ok(match ScraperKind::for_base_url(base_url) {
            ScraperKind::Profile(profile) => Box::new(ProfileScraper::new(profile, base, fetcher)),
            ScraperKind::Generic => Box::new(GenericScraper::new(base, fetcher)),
        })
    }
}

// ---------------------------------------------------------------------------
// Extraction helpers shared by adapters
// ---------------------------------------------------------------------------

static SURFACE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*m²").ok());

static ROOMS_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(chambres?|pièces?|rooms?)").ok());

/// Fetch a page body, swallowing errors.
pub(crate) async fn fetch_body(fetcher: &dyn PageFetcher, url: &str) -> Option<String> {
    match fetcher.fetch(url).await {
        Ok(page) => Some(page.body),
        Err(e) => {
            tracing::debug!(%url, error = %e, "scraper fetch failed");
            None
        }
    }
}

pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trimmed text of the first non-empty match.
pub(crate) fn first_text(doc: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    doc.select(&sel)
        .map(element_text)
        .find(|t| !t.is_empty())
}

/// Parse a money-like amount: `250 000`, `1.200.000`, `1 250,500`.
///
/// Groups of exactly three digits after a separator are thousands.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let groups: Vec<&str> = cleaned
        .split(['.', ','])
        .filter(|g| !g.is_empty())
        .collect();
    let (last, head) = groups.split_last()?;

    let value = if head.is_empty() || last.len() == 3 {
        groups.concat().parse::<f64>().ok()?
    } else {
        format!("{}.{last}", head.concat()).parse::<f64>().ok()?
    };
    (value > 0.0).then_some(value)
}

pub fn find_surface(text: &str) -> Option<u32> {
    SURFACE_RE
        .as_ref()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

pub fn find_rooms(text: &str) -> Option<u32> {
    ROOMS_RE
        .as_ref()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// First region named in `text`, capitalized.
pub fn find_city(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let region = REGIONS.iter().find(|r| lower.contains(*r))?;
    let mut chars = region.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Rent keywords are checked before sale keywords.
pub fn infer_transaction(text: &str) -> TransactionType {
    let lower = text.to_lowercase();
    if ["à louer", "location", "louer", "par mois"]
        .iter()
        .any(|k| lower.contains(k))
    {
        TransactionType::Rent
    } else if ["à vendre", "vente", "vendre"].iter().any(|k| lower.contains(k)) {
        TransactionType::Sale
    } else {
        TransactionType::Unknown
    }
}

pub fn listing_hash(title: Option<&str>, price: Option<f64>, surface: Option<u32>, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}|{}|{}|{}",
            title.unwrap_or_default(),
            price.unwrap_or_default(),
            surface.unwrap_or_default(),
            url
        )
        .as_bytes(),
    );
    format!("{:x}", hasher.finalize())
}

/// Resolve and dedup hrefs, keeping first-seen order.
pub(crate) fn push_unique(out: &mut Vec<String>, url: Url) {
    let mut url = url;
    url.set_fragment(None);
    let s = url.to_string();
    if !out.contains(&s) {
        out.push(s);
    }
}
