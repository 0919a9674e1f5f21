use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use scraper::Html;
use tracing::{error, info};
use url::Url;

use crate::config::ScrapeOptions;
use crate::parser::{html, json_ld};
use crate::record::{AppRecord, Marketplace};
use crate::pipeline::{self, ScrapeRun};
use crate::sitemap;

pub const SITEMAP_INDEX_URL: &str = "https://apps.shopify.com/sitemap.xml";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);
const CHILD_SITEMAP_DELAY: Duration = Duration::from_millis(500);
const NON_APP_SLUGS: &[&str] = &["collections", "categories", "partners", "browse"];

static BY_LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)by\s+<a[^>]*>([^<]+)</a>").unwrap());
static DATA_RATING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-rating=["']?([\d.]+)["']?"#).unwrap());
static STAR_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+\.?\d*)\s*(?:out of 5|stars|/5)").unwrap());

pub async fn scrape(client: &reqwest::Client, opts: &ScrapeOptions) -> Result<ScrapeRun> {
    let mut urls = discover_urls(client, SITEMAP_INDEX_URL).await?;
    opts.truncate(&mut urls);
    info!("Scraping {} Shopify listings", urls.len());

    pipeline::scrape_details(client, &urls, RATE_LIMIT_DELAY, parse_listing).await
}

/// Walk the sitemap index and collect unique app detail URLs. A child
/// sitemap that fails to load is logged and skipped.
pub async fn discover_urls(client: &reqwest::Client, index_url: &str) -> Result<Vec<String>> {
    let sitemaps = sitemap::fetch_sitemap_index(client, index_url).await?;
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for (i, sitemap_url) in sitemaps.iter().enumerate() {
        match sitemap::fetch_urlset(client, sitemap_url).await {
            Ok(locs) => {
                let before = urls.len();
                for loc in locs.into_iter().filter(|u| is_app_url(u)) {
                    if seen.insert(loc.clone()) {
                        urls.push(loc);
                    }
                }
                info!("Fetched {} URLs from {}", urls.len() - before, sitemap_url);
            }
            Err(e) => error!("Failed to fetch sitemap {}: {:#}", sitemap_url, e),
        }
        if i + 1 < sitemaps.len() {
            tokio::time::sleep(CHILD_SITEMAP_DELAY).await;
        }
    }

    info!("Found {} total unique app URLs", urls.len());
    Ok(urls)
}

/// `/apps/<slug>` pages only; category and collection pages are skipped.
fn is_app_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let parts: Vec<&str> = parsed.path().trim_matches('/').split('/').collect();
    matches!(parts.as_slice(), ["apps", slug] if !slug.is_empty() && !NON_APP_SLUGS.contains(slug))
}

/// JSON-LD first, then title/meta/text fallbacks.
pub fn parse_listing(page: &str, url: &str) -> Option<AppRecord> {
    let document = Html::parse_document(page);
    let mut record = AppRecord::new(Marketplace::ShopifyAppStore, url);

    let blocks = json_ld::extract_blocks(&document);
    if let Some(node) = json_ld::find_typed(&blocks, &["SoftwareApplication"]) {
        json_ld::apply_app_node(&mut record, &node, &["author"]);
    }

    if record.app_name.is_none() {
        record.app_name = html::title_without_site(&document, "Shopify App Store");
    }
    if record.description.is_none() {
        record.description = html::meta_description(&document);
    }
    if record.vendor_name.is_none() {
        record.vendor_name = BY_LINK_RE
            .captures(page)
            .map(|c| c[1].trim().to_string())
            .filter(|v| !v.is_empty());
    }
    if record.rating.is_none() {
        record.rating = DATA_RATING_RE
            .captures(page)
            .or_else(|| STAR_TEXT_RE.captures(page))
            .and_then(|c| c[1].parse::<f64>().ok())
            .filter(|r| (0.0..=5.0).contains(r));
    }
    if record.review_count == 0 {
        record.review_count = html::review_count(page).unwrap_or(0);
    }

    record.into_named()
}
