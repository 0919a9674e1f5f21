#[cfg(feature = "browser")]
mod browser;
mod config;
mod http;
mod marketplaces;
mod output;
mod parser;
mod pipeline;
mod publisher;
mod record;
mod sitemap;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use config::{normalize_endpoint, PublisherConfig, ScrapeOptions};
use pipeline::{ScrapeRun, ScrapeStats};
use publisher::Publisher;
use record::{AppRecord, Marketplace};

#[derive(Parser)]
#[command(
    name = "marketplace_scraper",
    about = "Scrape app marketplace listings and push them to a webhook in batches"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one marketplace (or `all`), save JSON, then deliver
    Scrape {
        /// Marketplace tag or short name (shopify, salesforce, ...), or `all`
        marketplace: String,
        /// Max apps per marketplace (0 = unlimited)
        #[arg(short = 'n', long, env = "SCRAPE_LIMIT")]
        limit: Option<usize>,
        /// Directory for the timestamped JSON output
        #[arg(long, default_value = config::DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,
        #[command(flatten)]
        delivery: DeliveryArgs,
    },
    /// Re-deliver a previously saved JSON file
    Push {
        file: PathBuf,
        #[command(flatten)]
        delivery: DeliveryArgs,
    },
    /// List supported marketplaces
    List,
}

#[derive(Args)]
struct DeliveryArgs {
    /// Webhook endpoint; delivery is skipped when unset
    #[arg(long, env = "CLAY_WEBHOOK_URL")]
    webhook_url: Option<String>,
    /// Records per POST
    #[arg(long, default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Pause between POSTs in milliseconds
    #[arg(long, default_value_t = config::DEFAULT_BATCH_DELAY_MS)]
    batch_delay_ms: u64,
    /// Per-POST timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,
}

impl DeliveryArgs {
    fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            batch_size: self.batch_size,
            inter_batch_delay: Duration::from_millis(self.batch_delay_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Deliver `records` if an endpoint is configured. Returns `None` when
    /// delivery was skipped.
    async fn deliver(&self, records: &[AppRecord]) -> Result<Option<usize>> {
        let Some(endpoint) = normalize_endpoint(self.webhook_url.as_deref()) else {
            info!("No CLAY_WEBHOOK_URL set, skipping webhook push");
            return Ok(None);
        };
        let publisher = Publisher::new(self.publisher_config())?;
        Ok(Some(publisher.deliver(records, endpoint).await))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scrape {
            marketplace,
            limit,
            output_dir,
            delivery,
        } => {
            let targets = resolve_targets(&marketplace)?;
            delivery.publisher_config().validate()?;
            let opts = ScrapeOptions {
                output_dir,
                ..Default::default()
            }
            .with_limit(limit);

            let mut failed = 0usize;
            for m in &targets {
                match run_one(*m, &opts, &delivery).await {
                    Ok(summary) => summary.print(),
                    Err(e) if targets.len() > 1 => {
                        failed += 1;
                        error!("{}: {:#}", m, e);
                    }
                    Err(e) => return Err(e),
                }
            }
            if failed > 0 {
                println!("{}/{} marketplaces failed, see log", failed, targets.len());
            }
            Ok(())
        }
        Commands::Push { file, delivery } => {
            let records = output::load_records(&file)?;
            match delivery.deliver(&records).await? {
                Some(n) => println!("Delivered {}/{} records from {}", n, records.len(), file.display()),
                None => println!("No webhook URL configured; nothing delivered."),
            }
            Ok(())
        }
        Commands::List => {
            println!("{:<24} | {:<22} | {}", "Tag", "Name", "Start URL");
            println!("{}", "-".repeat(90));
            for m in Marketplace::ALL {
                println!("{:<24} | {:<22} | {}", m.tag(), m.display_name(), m.base_url());
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn resolve_targets(name: &str) -> Result<Vec<Marketplace>> {
    if name.eq_ignore_ascii_case("all") {
        Ok(Marketplace::ALL.to_vec())
    } else {
        Ok(vec![name.parse()?])
    }
}

struct RunSummary {
    marketplace: Marketplace,
    stats: ScrapeStats,
    file: PathBuf,
    delivered: Option<usize>,
}

impl RunSummary {
    fn print(&self) {
        println!("{}", self.line());
    }

    fn line(&self) -> String {
        let delivered = match self.delivered {
            Some(n) => format!("{} delivered", n),
            None => "delivery skipped".to_string(),
        };
        format!(
            "{}: {}/{} listings extracted ({} empty, {} errors), saved to {} ({}).",
            self.marketplace.display_name(),
            self.stats.ok,
            self.stats.total,
            self.stats.empty,
            self.stats.errors,
            self.file.display(),
            delivered,
        )
    }
}

async fn run_one(marketplace: Marketplace, opts: &ScrapeOptions, delivery: &DeliveryArgs) -> Result<RunSummary> {
    let t = Instant::now();
    let ScrapeRun { records, stats } = marketplaces::scrape(marketplace, opts).await?;
    info!(
        "{}: {} apps scraped in {}",
        marketplace,
        records.len(),
        format_duration(t.elapsed())
    );

    let file = output::save_results(&records, marketplace, &opts.output_dir)?;
    let delivered = delivery.deliver(&records).await?;

    Ok(RunSummary {
        marketplace,
        stats,
        file,
        delivered,
    })
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_from_name() {
        assert_eq!(resolve_targets("all").unwrap().len(), 6);
        assert_eq!(resolve_targets("hubspot").unwrap(), vec![Marketplace::HubspotMarketplace]);
        assert!(resolve_targets("ebay").is_err());
    }

    #[test]
    fn cli_flags_and_defaults() {
        let cli = Cli::try_parse_from(["marketplace_scraper", "scrape", "shopify", "-n", "5"]).unwrap();
        match cli.command {
            Commands::Scrape { marketplace, limit, delivery, .. } => {
                assert_eq!(marketplace, "shopify");
                assert_eq!(limit, Some(5));
                assert_eq!(delivery.publisher_config(), PublisherConfig::default());
            }
            _ => panic!("expected scrape"),
        }
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn summary_reports_page_outcomes() {
        let summary = RunSummary {
            marketplace: Marketplace::NetsuiteSuiteapp,
            stats: ScrapeStats {
                total: 3,
                ok: 1,
                empty: 1,
                errors: 1,
            },
            file: PathBuf::from("data/netsuite_suiteapp_20260101_000000.json"),
            delivered: None,
        };
        assert_eq!(
            summary.line(),
            "NetSuite SuiteApp: 1/3 listings extracted (1 empty, 1 errors), \
             saved to data/netsuite_suiteapp_20260101_000000.json (delivery skipped)."
        );
    }
}
