use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ScrapeOptions;
use crate::parser::extract_domain;
use crate::parser::json_ld::{f64_field, str_field, u64_field};
use crate::record::{AppRecord, Marketplace};
use crate::pipeline::{self, ScrapeRun};
use crate::sitemap;

pub const SITEMAP_URL: &str = "https://appexchange.salesforce.com/sitemap.xml";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const RATE_LIMIT_DELAY: Duration = Duration::from_millis(1500);
const LISTING_URL_MARKER: &str = "appxListingDetail";

static STORES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)window\.stores\s*=\s*(\{.*?\});\s*(?:window\.|</script>)").unwrap()
});

pub async fn scrape(client: &reqwest::Client, opts: &ScrapeOptions) -> Result<ScrapeRun> {
    let mut urls = discover_urls(client, SITEMAP_URL).await?;
    opts.truncate(&mut urls);
    info!("Scraping {} AppExchange listings", urls.len());

    pipeline::scrape_details(client, &urls, RATE_LIMIT_DELAY, parse_page).await
}

pub async fn discover_urls(client: &reqwest::Client, sitemap_url: &str) -> Result<Vec<String>> {
    let urls: Vec<String> = sitemap::fetch_urlset(client, sitemap_url)
        .await?
        .into_iter()
        .filter(|u| u.contains(LISTING_URL_MARKER))
        .collect();
    info!("Found {} listing URLs in sitemap", urls.len());
    Ok(urls)
}

pub fn parse_page(page: &str, url: &str) -> Option<AppRecord> {
    let Some(stores) = extract_window_stores(page) else {
        warn!("No window.stores found: {}", url);
        return None;
    };
    parse_listing(&stores, url)
}

/// The page state object assigned to `window.stores` in an inline script.
pub fn extract_window_stores(page: &str) -> Option<Value> {
    let caps = STORES_RE.captures(page)?;
    match serde_json::from_str(&caps[1]) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Failed to parse window.stores JSON: {}", e);
            None
        }
    }
}

pub fn parse_listing(stores: &Value, url: &str) -> Option<AppRecord> {
    let listing = stores
        .get("LISTING")?
        .get("listing")
        .filter(|l| l.as_object().is_some_and(|o| !o.is_empty()))?;

    let mut record = AppRecord::new(Marketplace::SalesforceAppexchange, url);
    record.app_name = str_field(listing, "name");
    record.description = str_field(listing, "description");

    if let Some(publisher) = listing.get("publisher") {
        record.vendor_name = str_field(publisher, "name");
        record.vendor_website = str_field(publisher, "website");
        record.vendor_domain = extract_domain(record.vendor_website.as_deref());
        record.vendor_email = str_field(publisher, "email");
        record.vendor_location = str_field(publisher, "hQLocation");
    }

    let extensions = listing.get("extensions").and_then(Value::as_array);
    for ext in extensions.into_iter().flatten() {
        let cats = ext
            .get("data")
            .and_then(|d| d.get("listingCategories"))
            .and_then(Value::as_array);
        for cat in cats.into_iter().flatten() {
            match cat {
                Value::Object(_) => {
                    if let Some(name) = str_field(cat, "name") {
                        record.push_category(name);
                    }
                }
                Value::String(name) => record.push_category(name.clone()),
                _ => {}
            }
        }
    }
    if record.categories.is_empty() {
        if let Some(app_type) = str_field(listing, "appType") {
            record.categories.push(app_type);
        }
    }

    if let Some(summary) = listing.get("reviewsSummary") {
        record.rating = f64_field(summary, "averageRating");
        record.review_count = u64_field(summary, "reviewCount").unwrap_or(0);
    }

    record.into_named()
}
