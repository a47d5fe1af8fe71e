//! Relevance scoring for Tunisian real-estate content.
//!
//! Everything here is pure: the same text always yields the same score.

use std::sync::LazyLock;

use immoradar_shared::TechStack;
use regex::Regex;
use scraper::{Html, Node};

/// Weighted vertical terms, matched as case-insensitive substrings.
pub const KEYWORD_WEIGHTS: &[(&str, u32)] = &[
    ("immobilier", 10),
    ("appartement", 10),
    ("maison", 10),
    ("villa", 10),
    ("vente", 5),
    ("location", 5),
    ("annonces immobilières", 15),
    ("terrain", 5),
    ("agence immobilière", 15),
    ("loyer", 5),
    ("architecture", 2),
    ("résidence", 5),
];

/// Tunisian governorates and cities, as spelled on local sites.
pub const REGIONS: &[&str] = &[
    "tunis",
    "ariana",
    "ben arous",
    "manouba",
    "nabeul",
    "zaghouan",
    "benzart",
    "beja",
    "jendouza",
    "kef",
    "siliana",
    "kairouan",
    "kasserine",
    "sidi bouzid",
    "sousse",
    "monastir",
    "mahdia",
    "sfax",
    "gairouan",
    "tozeur",
    "kebili",
    "gabes",
    "mednine",
    "tataouine",
];

/// Flat weight for each region named in the text.
pub const REGION_WEIGHT: u32 = 5;

/// Flat weight for each matching price pattern.
pub const PRICE_WEIGHT: u32 = 20;

pub const MAX_SCORE: u8 = 100;

/// Amounts in Tunisian dinars.
static PRICE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"\d[\d\s.,]{2,}\s*(dt|tnd|dinars|millimes)"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Elements whose text never renders.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Score page text in `[0, 100]`.
///
/// Keyword weights, a flat weight per region and a flat weight per price
/// pattern are summed, then clamped.
pub fn score_content(text: &str) -> u8 {
    let text = text.to_lowercase();

    let keywords: u32 = KEYWORD_WEIGHTS
        .iter()
        .filter(|(kw, _)| text.contains(kw))
        .map(|(_, weight)| weight)
        .sum();

    let regions = REGIONS.iter().filter(|r| text.contains(*r)).count() as u32 * REGION_WEIGHT;

    let prices = PRICE_PATTERNS.iter().filter(|p| p.is_match(&text)).count() as u32 * PRICE_WEIGHT;

    (keywords + regions + prices).min(u32::from(MAX_SCORE)) as u8
}

/// Classify the site's front-end from raw markup. First fingerprint wins.
pub fn detect_tech_stack(markup: &str) -> TechStack {
    if markup.contains("__NEXT_DATA__") {
        TechStack::NextJS
    } else if markup.contains("wp-content") {
        TechStack::WordPress
    } else {
        TechStack::Vanilla
    }
}

/// Concatenate the document's rendered text, skipping scripts and styles.
pub fn visible_text(doc: &Html) -> String {
    let mut out = String::new();
    for node in doc.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let chunk = text.trim();
        if !chunk.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(chunk);
        }
    }
    out
}
