//! Generic (fallback) listing scraper.
//!
//! Used for any site without a selector profile. Entry pages come from
//! sitemaps, homepage category links, and finally guessed paths; listing
//! fields come from text heuristics.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use tracing::debug;
use url::Url;

use super::{
    ListingRecord, SiteScraper, element_text, fetch_body, find_city, find_rooms, find_surface,
    first_text, infer_transaction, parse_amount, push_unique, selector,
};
use crate::fetch::PageFetcher;
use crate::normalize::normalize_domain;
use crate::scoring::visible_text;

const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap-listings.xml"];
const SITEMAP_KEYWORDS: &[&str] = &["vente", "location", "achat", "listing", "immobilier", "bien"];
const CATEGORY_KEYWORDS: &[&str] = &[
    "vente",
    "location",
    "achat",
    "recherche",
    "immobilier",
    "bien",
    "propriete",
];
const GUESSED_PATHS: &[&str] = &["/recherche", "/annonces", "/proprietes", "/achat", "/location"];
const MAX_ENTRY_PAGES: usize = 15;
const LISTING_PATTERNS: &[&str] = &[
    "/annonce",
    "/vente",
    "/achat",
    "/bien",
    "/propriete",
    "/detail",
    "/property",
    "/produit",
    "/a/",
];
const DESCRIPTION_SELECTORS: &[&str] = &[
    ".description",
    ".block-content",
    ".content",
    ".listing-details",
    "#description",
    ".entry-content",
];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];
const MAX_IMAGES: usize = 10;
/// Amounts above this are phone numbers or placeholders.
const MAX_PLAUSIBLE_PRICE: f64 = 10_000_000.0;

static LOC_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<loc>\s*(.*?)\s*</loc>").ok());

static PRICE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:prix|price|montant|somme)?[:\s]*(\d[\d\s.,]{2,12})\s*(?:dt|tnd|dinars|€|\$)").ok()
});

/// Heuristic scraper for arbitrary static sites.
pub struct GenericScraper {
    base: Url,
    fetcher: Arc<dyn PageFetcher>,
}

impl GenericScraper {
    pub const NAME: &'static str = "generic";

    pub fn new(base: Url, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { base, fetcher }
    }

    fn same_site(&self, url: &Url) -> bool {
        normalize_domain(url.as_str()) == normalize_domain(self.base.as_str())
    }

    async fn sitemap_pages(&self) -> Vec<Url> {
        let mut found = Vec::new();
        let Some(loc_re) = LOC_RE.as_ref() else {
            return found;
        };
        for path in SITEMAP_PATHS {
            let Ok(sitemap) = self.base.join(path) else {
                continue;
            };
            let Some(body) = fetch_body(self.fetcher.as_ref(), sitemap.as_str()).await else {
                continue;
            };
            found.extend(
                loc_re
                    .captures_iter(&body)
                    .filter_map(|c| c.get(1))
                    .map(|m| m.as_str())
                    .filter(|u| matches_any(u, SITEMAP_KEYWORDS))
                    .filter_map(|u| Url::parse(u).ok()),
            );
        }
        found
    }

    fn homepage_categories(&self, body: &str) -> Vec<Url> {
        let doc = Html::parse_document(body);
        let Some(anchor) = selector("a[href]") else {
            return Vec::new();
        };
        doc.select(&anchor)
            .filter_map(|a| {
                let href = a.value().attr("href")?;
                let text = element_text(a);
                if matches_any(&text, CATEGORY_KEYWORDS) || matches_any(href, CATEGORY_KEYWORDS) {
                    self.base.join(href).ok()
                } else {
                    None
                }
            })
            .filter(|url| self.same_site(url))
            .collect()
    }

    fn listing_links(&self, body: &str, page: &Url) -> Vec<Url> {
        let doc = Html::parse_document(body);
        let Some(anchor) = selector("a[href]") else {
            return Vec::new();
        };
        doc.select(&anchor)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| page.join(href).ok())
            .filter(|url| matches_any(url.as_str(), LISTING_PATTERNS) && self.same_site(url))
            .collect()
    }
}

#[async_trait]
impl SiteScraper for GenericScraper {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn list_entry_pages(&self) -> Vec<String> {
        let mut pages = Vec::new();
        for url in self.sitemap_pages().await {
            push_unique(&mut pages, url);
        }

        if let Some(body) = fetch_body(self.fetcher.as_ref(), self.base.as_str()).await {
            for url in self.homepage_categories(&body) {
                push_unique(&mut pages, url);
            }
        }

        if pages.is_empty() {
            for path in GUESSED_PATHS {
                if let Ok(url) = self.base.join(path) {
                    push_unique(&mut pages, url);
                }
            }
        }

        pages.truncate(MAX_ENTRY_PAGES);
        debug!(base = %self.base, pages = pages.len(), "entry pages found");
        pages
    }

    async fn extract_listing_links(&self, page_url: &str) -> Vec<String> {
        let Ok(page) = Url::parse(page_url) else {
            return Vec::new();
        };
        let Some(body) = fetch_body(self.fetcher.as_ref(), page_url).await else {
            return Vec::new();
        };
        let mut links = Vec::new();
        for url in self.listing_links(&body, &page) {
            push_unique(&mut links, url);
        }
        links
    }

    async fn extract_listing_data(&self, listing_url: &str) -> Option<ListingRecord> {
        let body = fetch_body(self.fetcher.as_ref(), listing_url).await?;
        Some(parse_listing(&body, listing_url))
    }
}

fn matches_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// First plausible TND amount in the text.
pub fn find_price(text: &str) -> Option<f64> {
    let raw = PRICE_RE.as_ref()?.captures(text)?.get(1)?.as_str();
    parse_amount(raw).filter(|p| *p > 1.0 && *p <= MAX_PLAUSIBLE_PRICE)
}

fn parse_listing(body: &str, listing_url: &str) -> ListingRecord {
    let doc = Html::parse_document(body);
    let text = visible_text(&doc);
    let title = first_text(&doc, "h1");
    let description = DESCRIPTION_SELECTORS
        .iter()
        .find_map(|sel| first_text(&doc, sel));

    let mut image_urls = Vec::new();
    if let (Some(sel), Ok(page)) = (selector("img[src]"), Url::parse(listing_url)) {
        for src in doc.select(&sel).filter_map(|img| img.value().attr("src")) {
            let lower = src.to_lowercase();
            let is_photo = IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
                && !lower.contains("logo")
                && !lower.contains("icon");
            if !is_photo {
                continue;
            }
            if let Ok(url) = page.join(src) {
                push_unique(&mut image_urls, url);
            }
            if image_urls.len() >= MAX_IMAGES {
                break;
            }
        }
    }

    ListingRecord {
        url: listing_url.to_string(),
        price: find_price(&text),
        city: find_city(&text),
        surface_m2: find_surface(&text),
        rooms: find_rooms(&text),
        transaction: infer_transaction(&format!(
            "{} {}",
            title.as_deref().unwrap_or_default(),
            description.as_deref().unwrap_or_default()
        )),
        title,
        description,
        image_urls,
        content_hash: String::new(),
    }
    .finish()
}
