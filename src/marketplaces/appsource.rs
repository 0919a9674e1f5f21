use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use scraper::Html;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::ScrapeOptions;
use crate::http;
use crate::parser::html::{first_link, text_of, with_class};
use crate::parser::json_ld::{f64_field, str_field, u64_field};
use crate::parser::{extract_domain, resolve};
use crate::pipeline::ScrapeRun;
use crate::record::{AppRecord, Marketplace};

pub const BASE_URL: &str = "https://appsource.microsoft.com";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);
const PAGE_SIZE: usize = 50;
const LOG_INTERVAL: usize = 50;
/// Below this many API results the HTML catalog is tried as well.
const MIN_API_RESULTS: usize = 10;
const MAX_CATALOG_PAGES: usize = 50;

pub const DYNAMICS_PRODUCTS: &[&str] = &[
    "dynamics-365-business-central",
    "dynamics-365-for-finance-and-operations",
    "dynamics-365-for-sales",
    "dynamics-365-for-customer-service",
    "dynamics-365-for-field-service",
    "dynamics-365-for-marketing",
    "dynamics-365-for-project-service-automation",
    "dynamics-365",
];

static CARD_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)product|app|card").unwrap());
static TITLE_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)title|name").unwrap());
static VENDOR_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)publisher|vendor|company").unwrap());

pub async fn scrape(client: &reqwest::Client, opts: &ScrapeOptions) -> Result<ScrapeRun> {
    scrape_from(client, BASE_URL, DYNAMICS_PRODUCTS, opts).await
}

/// API discovery, falling back to the HTML catalog when the API yields
/// fewer than a handful of apps. The larger result wins.
pub async fn scrape_from(
    client: &reqwest::Client,
    base_url: &str,
    products: &[&str],
    opts: &ScrapeOptions,
) -> Result<ScrapeRun> {
    info!("Attempting API-based discovery...");
    let apps = discover_apps(client, base_url, products, opts).await;

    let mut records = Vec::new();
    for (i, app) in apps.iter().enumerate() {
        if let Some(record) = parse_app(base_url, app) {
            records.push(record);
        }
        if (i + 1) % LOG_INTERVAL == 0 {
            info!("Progress: {}/{} apps parsed", i + 1, apps.len());
        }
    }

    let mut run = ScrapeRun::from_parsed(apps.len(), records);

    if run.records.len() < MIN_API_RESULTS {
        info!("API returned few results, trying HTML scraping...");
        let html_records = scrape_catalog_html(client, base_url, products, opts).await;
        if html_records.len() > run.records.len() {
            run = ScrapeRun::from_parsed(html_records.len(), html_records);
        }
    }

    info!("Scraping complete: {} apps extracted", run.records.len());
    if run.records.is_empty() {
        warn!("No apps found");
    }
    Ok(run)
}

/// One page of the search API. A failed request reads as an empty page.
async fn fetch_apps_page(client: &reqwest::Client, base_url: &str, product: &str, page: usize) -> Value {
    let api_url = format!("{}/api/search", base_url);
    let page = page.to_string();
    let page_size = PAGE_SIZE.to_string();
    let query = [
        ("product", product),
        ("page", page.as_str()),
        ("pageSize", page_size.as_str()),
        ("country", "US"),
        ("language", "en-us"),
    ];
    match http::fetch_json::<Value, _>(client, &api_url, &query).await {
        Ok(v) => v,
        Err(e) => {
            error!("API request failed for {} page {}: {:#}", product, page, e);
            Value::Null
        }
    }
}

fn apps_in(data: &Value) -> Vec<Value> {
    if let Value::Array(items) = data {
        return items.clone();
    }
    ["apps", "results", "items"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

fn app_id(app: &Value) -> Option<String> {
    ["id", "appId", "productId"].iter().find_map(|k| match app.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Page through every product filter, deduplicating apps by id.
pub async fn discover_apps(
    client: &reqwest::Client,
    base_url: &str,
    products: &[&str],
    opts: &ScrapeOptions,
) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut all_apps = Vec::new();

    for (pi, product) in products.iter().enumerate() {
        info!("Fetching apps for product: {}", product);
        let mut page = 1;
        let mut product_count = 0;

        loop {
            let data = fetch_apps_page(client, base_url, product, page).await;
            let apps = apps_in(&data);
            if apps.is_empty() {
                break;
            }

            let page_len = apps.len();
            for app in apps {
                if let Some(id) = app_id(&app) {
                    if seen.insert(id) {
                        all_apps.push(app);
                        product_count += 1;
                    }
                }
            }
            info!(
                "  Page {}: Found {} apps (total for {}: {})",
                page, page_len, product, product_count
            );

            let total_count = u64_field(&data, "totalCount")
                .or_else(|| u64_field(&data, "total"))
                .unwrap_or(0) as usize;
            if all_apps.len() >= total_count || page_len < PAGE_SIZE {
                break;
            }
            if opts.limit_reached(all_apps.len()) {
                info!("Reached limit of {} apps", all_apps.len());
                break;
            }

            page += 1;
            tokio::time::sleep(RATE_LIMIT_DELAY).await;
        }

        if opts.limit_reached(all_apps.len()) {
            break;
        }
        if pi + 1 < products.len() {
            tokio::time::sleep(RATE_LIMIT_DELAY).await;
        }
    }

    opts.truncate(&mut all_apps);
    info!("Discovered {} total unique apps", all_apps.len());
    all_apps
}

/// Normalize one search API entry. The API has shipped several field
/// spellings, so each field tries them in turn.
pub fn parse_app(base_url: &str, app: &Value) -> Option<AppRecord> {
    let id = app_id(app)?;
    let mut record = AppRecord::new(
        Marketplace::MicrosoftAppsource,
        format!("{}/en-us/product/{}", base_url, id),
    );

    record.app_name = ["title", "displayName", "name"]
        .iter()
        .find_map(|k| str_field(app, k));
    record.description = ["description", "shortDescription", "summary"]
        .iter()
        .find_map(|k| str_field(app, k));

    match app.get("publisher") {
        Some(p @ Value::Object(_)) => {
            record.vendor_name = str_field(p, "displayName").or_else(|| str_field(p, "name"));
            record.vendor_website = str_field(p, "website").or_else(|| str_field(p, "websiteUrl"));
        }
        Some(Value::String(name)) if !name.trim().is_empty() => {
            record.vendor_name = Some(name.trim().to_string());
        }
        _ => {}
    }
    if record.vendor_name.is_none() {
        record.vendor_name = str_field(app, "publisherName").or_else(|| str_field(app, "vendorName"));
    }
    record.vendor_domain = extract_domain(record.vendor_website.as_deref());

    for cat in app.get("categories").and_then(Value::as_array).into_iter().flatten() {
        match cat {
            Value::Object(_) => {
                if let Some(name) = str_field(cat, "name").or_else(|| str_field(cat, "displayName")) {
                    record.push_category(name);
                }
            }
            Value::String(name) => record.push_category(name.clone()),
            _ => {}
        }
    }
    for prod in app.get("products").and_then(Value::as_array).into_iter().flatten() {
        match prod {
            Value::Object(_) => {
                if let Some(name) = str_field(prod, "displayName").or_else(|| str_field(prod, "name")) {
                    record.push_category(name);
                }
            }
            Value::String(name) => record.push_category(name.clone()),
            _ => {}
        }
    }

    match app.get("rating") {
        Some(r @ Value::Object(_)) => {
            record.rating = f64_field(r, "average").or_else(|| f64_field(r, "averageRating"));
            record.review_count = u64_field(r, "count")
                .or_else(|| u64_field(r, "totalCount"))
                .unwrap_or(0);
        }
        Some(Value::Number(n)) => record.rating = n.as_f64(),
        _ => {}
    }
    if record.rating.is_none() {
        record.rating = f64_field(app, "averageRating").or_else(|| f64_field(app, "ratingAverage"));
    }
    if record.review_count == 0 {
        record.review_count = u64_field(app, "ratingCount")
            .or_else(|| u64_field(app, "reviewCount"))
            .unwrap_or(0);
    }

    record.into_named()
}

/// Scrape the public catalog pages product by product. A product ends at a
/// failed fetch, a page with no cards, a page that adds no new app, or after
/// `MAX_CATALOG_PAGES`.
async fn scrape_catalog_html(
    client: &reqwest::Client,
    base_url: &str,
    products: &[&str],
    opts: &ScrapeOptions,
) -> Vec<AppRecord> {
    let mut records: Vec<AppRecord> = Vec::new();
    let mut seen = HashSet::new();

    'products: for product in products {
        for page in 1..=MAX_CATALOG_PAGES {
            let url = format!(
                "{}/en-us/marketplace/apps?product={}&page={}",
                base_url, product, page
            );
            let body = match http::fetch_text(client, &url).await {
                Ok(b) => b,
                Err(e) => {
                    error!("HTML scraping failed for {} page {}: {:#}", product, page, e);
                    break;
                }
            };

            let Some(cards) = parse_catalog_page(&body, base_url, product) else {
                break;
            };
            let before = records.len();
            for record in cards {
                if seen.insert(record.app_url.clone()) {
                    records.push(record);
                }
                if opts.limit_reached(records.len()) {
                    break 'products;
                }
            }
            if records.len() == before {
                info!("No new apps on {} page {}, moving on", product, page);
                break;
            }

            if page < MAX_CATALOG_PAGES {
                tokio::time::sleep(RATE_LIMIT_DELAY).await;
            }
        }
    }
    records
}

/// Records from the app cards on one catalog page; `None` when the page has
/// no cards at all.
fn parse_catalog_page(body: &str, base_url: &str, product: &str) -> Option<Vec<AppRecord>> {
    let document = Html::parse_document(body);
    let cards = with_class(&document, &CARD_CLASS_RE);
    if cards.is_empty() {
        return None;
    }

    let mut records = Vec::new();
    for card in cards {
        let Some(href) = first_link(card).and_then(|a| a.value().attr("href")) else {
            continue;
        };
        if !href.contains("/product/") {
            continue;
        }
        let Some(app_url) = resolve(base_url, href) else {
            continue;
        };

        let mut record = AppRecord::new(Marketplace::MicrosoftAppsource, app_url);
        record.categories.push(product.to_string());
        record.app_name = card
            .descendants()
            .filter_map(scraper::ElementRef::wrap)
            .skip(1)
            .find(|el| el.value().classes().any(|c| TITLE_CLASS_RE.is_match(c)))
            .map(text_of)
            .filter(|t| !t.is_empty());
        record.vendor_name = card
            .descendants()
            .filter_map(scraper::ElementRef::wrap)
            .skip(1)
            .find(|el| el.value().classes().any(|c| VENDOR_CLASS_RE.is_match(c)))
            .map(text_of)
            .filter(|t| !t.is_empty());

        if let Some(record) = record.into_named() {
            records.push(record);
        }
    }
    Some(records)
}
