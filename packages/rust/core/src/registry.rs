//! Trusted seed websites registered before discovery.

use immoradar_crawler::normalize_domain;
use immoradar_shared::{
    DEFAULT_CRAWL_BUDGET, ImmoRadarError, Result, TechStack, ValidationStatus, Website,
};
use immoradar_storage::Storage;
use tracing::{debug, info, instrument};

pub const SEED_SOURCE: &str = "seed";

/// `(display name, base url)` of every trusted site.
pub const SEED_SITES: &[(&str, &str)] = &[
    ("Mubawab", "https://www.mubawab.tn"),
    ("Tayara", "https://www.tayara.tn"),
];

/// What [`register_seed_websites`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub reactivated: usize,
    pub unchanged: usize,
}

fn seed_website(name: &str, base_url: String) -> Website {
    Website {
        name: name.to_string(),
        base_url,
        confidence_score: 100,
        discovery_source: SEED_SOURCE.to_string(),
        tech_stack: TechStack::Unknown,
        validation_status: ValidationStatus::Valid,
        discovery_depth: 0,
        is_active: true,
        crawl_budget: DEFAULT_CRAWL_BUDGET,
        created_at: chrono::Utc::now(),
        last_validated_at: None,
    }
}

/// Make sure every seed site exists and is active.
///
/// Absent sites are inserted; inactive ones are reactivated with full
/// confidence; active ones are left alone.
#[instrument(skip_all)]
pub async fn register_seed_websites(storage: &Storage) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for (name, url) in SEED_SITES {
        let base_url = normalize_domain(url)
            .ok_or_else(|| ImmoRadarError::validation(format!("bad seed url: {url}")))?;

        match storage.find_website(&base_url).await? {
            None => {
                storage.insert_website(&seed_website(name, base_url.clone())).await?;
                info!(%base_url, "registered seed website");
                report.inserted += 1;
            }
            Some(mut site) if !site.is_active => {
                site.is_active = true;
                site.confidence_score = 100;
                storage.save_website(&site).await?;
                info!(%base_url, "reactivated seed website");
                report.reactivated += 1;
            }
            Some(_) => {
                debug!(%base_url, "seed website already active");
                report.unchanged += 1;
            }
        }
    }

    Ok(report)
}
