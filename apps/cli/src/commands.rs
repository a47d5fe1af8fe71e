//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use immoradar_core::{
    DiscoveryProgress, DiscoveryReport, Orchestrator, register_seed_websites,
};
use immoradar_crawler::{HttpFetcher, ScraperKind, ValidationOutcome, normalize_domain};
use immoradar_discovery::{CrtShClient, SearchProvider, SerpApiClient};
use immoradar_shared::{
    AppConfig, DiscoveryConfig, MAX_POLITENESS_DELAY_SECS, init_config, load_config,
    resolve_db_path, search_api_key,
};
use immoradar_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ImmoRadar: find Tunisian real-estate websites.
#[derive(Parser)]
#[command(
    name = "immoradar",
    version,
    about = "Discover and validate Tunisian real-estate websites.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one discovery pass and persist validated websites.
    Discover {
        /// Search with this query only (skips the certificate log).
        #[arg(short, long)]
        query: Option<String>,

        /// Expansion ceiling (overrides config).
        #[arg(long)]
        max_depth: Option<u32>,

        /// Maximum simultaneous validations (overrides config).
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Politeness delay in seconds before each fetch (overrides config).
        #[arg(long)]
        delay: Option<f64>,

        /// Do not register the trusted seed websites first.
        #[arg(long)]
        no_seed: bool,
    },

    /// Register the trusted seed websites.
    Seed,

    /// List stored websites, best first.
    Sites {
        /// Only show websites scoring at least this much.
        #[arg(long, default_value = "0")]
        min_score: u8,
    },

    /// Show outbound edges recorded for a domain.
    Relations {
        /// Domain or URL (normalized before lookup).
        url: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "immoradar=info",
        1 => "immoradar=debug",
        _ => "immoradar=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Discover {
            query,
            max_depth,
            concurrency,
            delay,
            no_seed,
        } => {
            let overrides = Overrides {
                max_depth,
                concurrency,
                delay,
            };
            cmd_discover(query.as_deref(), overrides, no_seed).await
        }
        Command::Seed => cmd_seed().await,
        Command::Sites { min_score } => cmd_sites(min_score).await,
        Command::Relations { url } => cmd_relations(&url).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Flag values that override the loaded config.
struct Overrides {
    max_depth: Option<u32>,
    concurrency: Option<usize>,
    delay: Option<f64>,
}

impl Overrides {
    fn apply(&self, config: &mut DiscoveryConfig) -> Result<()> {
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(n) = self.concurrency {
            config.max_concurrency = n.max(1);
        }
        if let Some(secs) = self.delay {
            if !secs.is_finite() || !(0.0..=MAX_POLITENESS_DELAY_SECS).contains(&secs) {
                return Err(eyre!(
                    "invalid --delay '{secs}': expected 0 to {MAX_POLITENESS_DELAY_SECS} seconds"
                ));
            }
            config.politeness_delay = Duration::from_secs_f64(secs);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = resolve_db_path(config)?;
    Ok(Arc::new(Storage::open(&path).await?))
}

async fn open_storage_readonly(config: &AppConfig) -> Result<Storage> {
    let path = resolve_db_path(config)?;
    Ok(Storage::open_readonly(&path).await?)
}

async fn cmd_discover(query: Option<&str>, overrides: Overrides, no_seed: bool) -> Result<()> {
    let config = load_config()?;
    let mut discovery = DiscoveryConfig::from(&config);
    overrides.apply(&mut discovery)?;

    let storage = open_storage(&config).await?;

    if !no_seed {
        let seeded = register_seed_websites(&storage).await?;
        info!(
            inserted = seeded.inserted,
            reactivated = seeded.reactivated,
            "seed websites registered"
        );
    }

    let search = SerpApiClient::new(&config.search, search_api_key(&config))?;
    if !search.is_available() {
        warn!(
            env = %config.search.api_key_env,
            "no search API key set; seeding from the certificate log only"
        );
    }
    let cert_log = CrtShClient::new(&config.cert_log)?;
    let fetcher = HttpFetcher::new(discovery.request_timeout)?;

    info!(
        query = query.unwrap_or("<generic>"),
        max_depth = discovery.max_depth,
        concurrency = discovery.max_concurrency,
        "starting discovery"
    );

    let orchestrator = Orchestrator::new(
        discovery,
        storage.clone(),
        Arc::new(search),
        Arc::new(cert_log),
        Arc::new(fetcher),
    );

    let reporter = CliProgress::new();
    let report = orchestrator.run(query, &reporter).await?;

    let stored = storage.list_websites(0).await?.len();

    println!();
    println!("  Discovery finished.");
    println!("  Run:         {}", report.run_id);
    println!("  Seeds:       {}", report.seeds_accepted);
    println!("  Dispatched:  {}", report.tasks_dispatched);
    println!(
        "  Validated:   {} ({} partial)",
        report.validated + report.partial,
        report.partial
    );
    println!("  Failed:      {}", report.fetch_failures + report.store_failures);
    println!(
        "  New sites:   {} ({} updated)",
        report.websites_inserted, report.websites_updated
    );
    println!("  Stored:      {stored}");
    println!(
        "  Time:        {:.1}s",
        Duration::from_millis(report.duration_ms).as_secs_f64()
    );
    println!();

    Ok(())
}

async fn cmd_seed() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let report = register_seed_websites(&storage).await?;
    println!(
        "Seed websites: {} inserted, {} reactivated, {} unchanged",
        report.inserted, report.reactivated, report.unchanged
    );
    Ok(())
}

async fn cmd_sites(min_score: u8) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;
    let sites = storage.list_websites(min_score).await?;

    if sites.is_empty() {
        println!("No websites with score >= {min_score}.");
        return Ok(());
    }

    println!(
        "{:<40} {:>5} {:<13} {:<10} {:>5} {:<8}",
        "WEBSITE", "SCORE", "STATUS", "TECH", "DEPTH", "SCRAPER"
    );
    for site in &sites {
        println!(
            "{:<40} {:>5} {:<13} {:<10} {:>5} {:<8}",
            site.base_url,
            site.confidence_score,
            site.validation_status.as_str(),
            site.tech_stack.as_str(),
            site.discovery_depth,
            ScraperKind::for_base_url(&site.base_url).name(),
        );
    }
    println!();
    println!("{} website(s)", sites.len());
    Ok(())
}

async fn cmd_relations(url: &str) -> Result<()> {
    let domain = normalize_domain(url)
        .or_else(|| normalize_domain(&format!("https://{url}")))
        .ok_or_else(|| eyre!("invalid domain '{url}'"))?;

    let config = load_config()?;
    let storage = open_storage_readonly(&config).await?;
    let relations = storage.list_relations_from(&domain).await?;

    if relations.is_empty() {
        println!("No relations recorded from {domain}.");
        return Ok(());
    }

    for rel in &relations {
        println!(
            "{} -> {}  [{}] {}",
            rel.source_domain,
            rel.target_domain,
            rel.relation_type.as_str(),
            rel.discovered_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl DiscoveryProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn task_started(&self, domain: &str, pending: usize) {
        self.spinner
            .set_message(format!("Validating {domain} ({pending} queued)"));
    }

    fn task_finished(&self, outcome: &ValidationOutcome, completed: usize) {
        let verdict = match outcome {
            ValidationOutcome::Validated(site) | ValidationOutcome::Partial(site) => {
                format!("score {}", site.score)
            }
            ValidationOutcome::FetchFailed { .. } => "unreachable".to_string(),
            ValidationOutcome::StoreFailed { .. } => "not stored".to_string(),
        };
        self.spinner
            .set_message(format!("[{completed}] {} {verdict}", outcome.domain()));
    }

    fn done(&self, _report: &DiscoveryReport) {
        self.spinner.finish_and_clear();
    }
}
