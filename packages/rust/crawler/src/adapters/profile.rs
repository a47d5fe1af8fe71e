//! Selector-profile scrapers for portals with a known layout.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use tracing::debug;
use url::Url;

use super::{
    ListingRecord, SiteScraper, element_text, fetch_body, find_city, find_rooms, find_surface,
    first_text, infer_transaction, parse_amount, push_unique, selector,
};
use crate::fetch::PageFetcher;
use crate::scoring::visible_text;

/// How a category page is paginated.
#[derive(Debug, PartialEq, Eq)]
pub enum Paging {
    /// `<page>?<param>=<n>`
    Query(&'static str),
    /// `<page>/<prefix><n>`
    PathSegment(&'static str),
}

impl Paging {
    fn page_url(&self, page_url: &str, n: u32) -> String {
        match self {
            Self::Query(param) => format!("{page_url}?{param}={n}"),
            Self::PathSegment(prefix) => {
                format!("{}/{prefix}{n}", page_url.trim_end_matches('/'))
            }
        }
    }
}

/// CSS selectors and URL shapes of one portal.
#[derive(Debug, PartialEq, Eq)]
pub struct SiteProfile {
    pub name: &'static str,
    /// Registrable domain, without `www.`.
    pub domain: &'static str,
    pub entry_paths: &'static [&'static str],
    pub paging: Paging,
    pub pages: u32,
    /// Listing cards on a category page.
    pub card_selector: &'static str,
    /// A card link must contain one of these to be a listing.
    pub link_patterns: &'static [&'static str],
    /// Patterns for a whole-page scan when no card matched.
    pub fallback_patterns: &'static [&'static str],
    pub price_selector: &'static str,
    pub description_selector: &'static str,
    pub characteristics_selector: Option<&'static str>,
    pub image_selector: &'static str,
}

pub static MUBAWAB: SiteProfile = SiteProfile {
    name: "mubawab",
    domain: "mubawab.tn",
    entry_paths: &[
        "/vente-immobilier-sc-1",
        "/location-immobilier-sc-2",
        "/locations-vacances-sc-3",
    ],
    paging: Paging::Query("p"),
    pages: 3,
    card_selector: ".listingCard, li.listing-card, div.listing-item, .listingCard-item",
    link_patterns: &["/a/", "/pa/"],
    fallback_patterns: &["/a/", "/pa/", "/annonce/"],
    price_selector: ".orangePrice, .price, .item-price",
    description_selector: ".block-content p, .description, .adMainDescription",
    characteristics_selector: Some(".adMainChar li, .property-amenities li"),
    image_selector: ".slider-item img, .gallery img, #property-gallery img",
};

pub static MENZILI: SiteProfile = SiteProfile {
    name: "menzili",
    domain: "menzili.tn",
    entry_paths: &["/vente-immobilier", "/location-immobilier", "/location-vacance"],
    paging: Paging::PathSegment("page-"),
    pages: 2,
    card_selector: r#".property-item, .listing-item, a[href*="/immobilier/"]"#,
    link_patterns: &["/immobilier/"],
    fallback_patterns: &[],
    price_selector: ".price, .property-price, .item-price",
    description_selector: ".property-description, .description, .entry-content",
    characteristics_selector: None,
    image_selector: ".property-gallery img, .slider img, .owl-carousel img",
};

/// A [`SiteScraper`] driven by a [`SiteProfile`].
pub struct ProfileScraper {
    profile: &'static SiteProfile,
    base: Url,
    fetcher: Arc<dyn PageFetcher>,
}

impl ProfileScraper {
    pub fn new(profile: &'static SiteProfile, base: Url, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            profile,
            base,
            fetcher,
        }
    }
}

#[async_trait]
impl SiteScraper for ProfileScraper {
    fn name(&self) -> &str {
        self.profile.name
    }

    async fn list_entry_pages(&self) -> Vec<String> {
        self.profile
            .entry_paths
            .iter()
            .filter_map(|path| self.base.join(path).ok())
            .map(|url| url.to_string())
            .collect()
    }

    async fn extract_listing_links(&self, page_url: &str) -> Vec<String> {
        let mut links = Vec::new();
        for n in 1..=self.profile.pages {
            let paged = self.profile.paging.page_url(page_url, n);
            let Some(body) = fetch_body(self.fetcher.as_ref(), &paged).await else {
                continue;
            };
            for link in card_links(self.profile, &body, &self.base) {
                push_unique(&mut links, link);
            }
        }
        debug!(scraper = self.profile.name, %page_url, links = links.len(), "listing links extracted");
        links
    }

    async fn extract_listing_data(&self, listing_url: &str) -> Option<ListingRecord> {
        let body = fetch_body(self.fetcher.as_ref(), listing_url).await?;
        Some(parse_listing(self.profile, &body, listing_url))
    }
}

/// Listing URLs from the cards of one category page.
fn card_links(profile: &SiteProfile, body: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(body);
    let mut hrefs: Vec<&str> = Vec::new();

    if let (Some(cards), Some(anchor)) = (selector(profile.card_selector), selector("a[href]")) {
        for card in doc.select(&cards) {
            let href = card
                .value()
                .attr("href")
                .or_else(|| card.select(&anchor).next().and_then(|a| a.value().attr("href")));
            if let Some(href) = href {
                if matches_any(href, profile.link_patterns) {
                    hrefs.push(href);
                }
            }
        }

        if hrefs.is_empty() && !profile.fallback_patterns.is_empty() {
            hrefs.extend(
                doc.select(&anchor)
                    .filter_map(|a| a.value().attr("href"))
                    .filter(|href| matches_any(href, profile.fallback_patterns)),
            );
        }
    }

    hrefs.into_iter().filter_map(|h| base.join(h).ok()).collect()
}

fn matches_any(href: &str, patterns: &[&str]) -> bool {
    let lower = href.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

fn parse_listing(profile: &SiteProfile, body: &str, listing_url: &str) -> ListingRecord {
    let doc = Html::parse_document(body);
    let text = visible_text(&doc);

    let title = first_text(&doc, "h1");
    let price = first_text(&doc, profile.price_selector).and_then(|p| parse_amount(&p));
    let description = first_text(&doc, profile.description_selector);

    let mut surface_m2 = None;
    let mut rooms = None;
    if let Some(sel) = profile.characteristics_selector.and_then(selector) {
        for item in doc.select(&sel) {
            let item = element_text(item).to_lowercase();
            if surface_m2.is_none() && item.contains("m²") {
                surface_m2 = find_surface(&item);
            }
            if rooms.is_none() && (item.contains("chambre") || item.contains("pièce")) {
                rooms = item
                    .split(|c: char| !c.is_ascii_digit())
                    .find(|d| !d.is_empty())
                    .and_then(|d| d.parse().ok());
            }
        }
    }
    let surface_m2 = surface_m2.or_else(|| find_surface(&text));
    let rooms = rooms.or_else(|| find_rooms(&text));

    let mut image_urls = Vec::new();
    if let (Some(sel), Ok(page)) = (selector(profile.image_selector), Url::parse(listing_url)) {
        for img in doc.select(&sel) {
            let src = img
                .value()
                .attr("src")
                .or_else(|| img.value().attr("data-src"));
            if let Some(resolved) = src.and_then(|s| page.join(s).ok()) {
                push_unique(&mut image_urls, resolved);
            }
        }
    }

    let transaction = infer_transaction(&format!(
        "{} {} {listing_url}",
        title.as_deref().unwrap_or_default(),
        description.as_deref().unwrap_or_default()
    ));

    ListingRecord {
        url: listing_url.to_string(),
        title,
        price,
        city: find_city(&text),
        surface_m2,
        rooms,
        transaction,
        description,
        image_urls,
        content_hash: String::new(),
    }
    .finish()
}
