use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::config::ScrapeOptions;
use crate::parser::{extract_domain, html, json_ld, resolve};
use crate::pipeline::{self, PagePolicy, ScrapeRun};
use crate::record::{AppRecord, Marketplace};

pub const BASE_URL: &str = "https://marketplace.acumatica.com";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const RATE_LIMIT_DELAY: Duration = Duration::from_millis(1500);
const MAX_PAGES: usize = 50;
const DESCRIPTION_MAX_CHARS: usize = 500;
const NOT_CATEGORIES: &[&str] = &["view", "details", "learn more", "get", "buy"];

static LISTING_HREF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)/listing/").unwrap());
static CARD_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)card|listing|product|app").unwrap());
static DESCRIPTION_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)description|overview|summary|about").unwrap());
static VENDOR_CLASS_RES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)vendor|developer|partner|company|publisher").unwrap(),
        Regex::new(r"(?i)provider|author|created-by").unwrap(),
    ]
});
static WEBSITE_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)website|visit|home").unwrap());
static CATEGORY_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)category|tag|badge|label").unwrap());
static CATEGORY_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/category/|/tag/|type=|category=").unwrap());
static SECTION_CAPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)industries?|modules?|features?").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static EXTERNAL_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href^='http']").unwrap());
static RATING_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)rating|stars|score").unwrap());

pub async fn scrape(client: &reqwest::Client, opts: &ScrapeOptions) -> Result<ScrapeRun> {
    let urls = discover_urls(client, BASE_URL, opts).await;
    if urls.is_empty() {
        warn!("No app URLs discovered");
        return Ok(ScrapeRun::default());
    }
    info!("Scraping {} Acumatica listings", urls.len());

    pipeline::scrape_details(client, &urls, RATE_LIMIT_DELAY, parse_app_page).await
}

pub async fn discover_urls(client: &reqwest::Client, base_url: &str, opts: &ScrapeOptions) -> Vec<String> {
    let listings = format!("{}/listings", base_url);
    let pages: Vec<String> = (1..=MAX_PAGES)
        .map(|p| if p == 1 { listings.clone() } else { format!("{}?page={}", listings, p) })
        .collect();

    pipeline::discover_paginated(
        client,
        &pages,
        RATE_LIMIT_DELAY,
        opts,
        PagePolicy::default(),
        |body| listing_links(body, base_url),
    )
    .await
}

/// Detail links on one listings page: any `/listing/` href, or failing that
/// the first link of each card-like element.
fn listing_links(body: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(body);

    let mut hrefs = html::hrefs_matching(&document, &LISTING_HREF_RE);
    if hrefs.is_empty() {
        hrefs = html::with_class(&document, &CARD_CLASS_RE)
            .into_iter()
            .filter_map(html::first_link)
            .filter_map(|a| a.value().attr("href"))
            .filter(|h| h.to_lowercase().contains("/listing"))
            .map(str::to_string)
            .collect();
    }

    let mut urls: Vec<String> = Vec::new();
    for href in hrefs {
        if let Some(url) = resolve(base_url, &href) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

pub fn parse_app_page(page: &str, url: &str) -> Option<AppRecord> {
    let document = Html::parse_document(page);
    let mut record = AppRecord::new(Marketplace::AcumaticaMarketplace, url);

    let blocks = json_ld::extract_blocks(&document);
    if let Some(node) = json_ld::find_typed(&blocks, &["Product", "SoftwareApplication", "WebApplication"]) {
        json_ld::apply_app_node(&mut record, &node, &["brand", "manufacturer"]);
    }

    if record.app_name.is_none() {
        record.app_name = html::first_text(&document, "h1")
            .or_else(|| html::title_without_site(&document, "Acumatica"));
    }

    if record.description.is_none() {
        record.description = html::meta_description(&document).or_else(|| {
            html::with_class(&document, &DESCRIPTION_CLASS_RE)
                .into_iter()
                .next()
                .map(|el| html::truncate_chars(&html::text_of(el), DESCRIPTION_MAX_CHARS))
                .filter(|d| !d.is_empty())
        });
    }

    if record.vendor_name.is_none() {
        let found = VENDOR_CLASS_RES
            .iter()
            .find_map(|re| html::vendor_from_element(&document, re, Some("acumatica.com")));
        if let Some((name, website)) = found {
            record.vendor_name = Some(name);
            if website.is_some() {
                record.vendor_domain = extract_domain(website.as_deref());
                record.vendor_website = website;
            }
        }
    }
    if record.vendor_name.is_none() {
        record.vendor_name = html::vendor_by_pattern(page, 100);
    }

    if record.vendor_website.is_none() {
        if let Some(site) = website_link(&document) {
            record.vendor_domain = extract_domain(Some(&site));
            record.vendor_website = Some(site);
        }
    }

    let classed = html::with_class(&document, &CATEGORY_CLASS_RE);
    for label in html::labels(classed, 10, NOT_CATEGORIES) {
        record.push_category(label);
    }
    let cat_links = category_links(&document);
    for label in html::labels(cat_links, 5, &[]) {
        record.push_category(label);
    }
    for label in html::labels_near_text(&document, &SECTION_CAPTION_RE, 5) {
        record.push_category(label);
    }

    if record.rating.is_none() {
        record.rating = html::rating_from_elements(&document, &RATING_CLASS_RE);
    }
    if record.review_count == 0 {
        record.review_count = html::review_count(page).unwrap_or(0);
    }

    record.into_named()
}

/// An off-site link labelled like "Visit website".
fn website_link(document: &Html) -> Option<String> {
    document
        .select(&EXTERNAL_LINK_SEL)
        .filter(|a| WEBSITE_TEXT_RE.is_match(&html::text_of(*a)))
        .filter_map(|a| a.value().attr("href"))
        .find(|h| !h.contains("acumatica.com"))
        .map(str::to_string)
}

fn category_links(document: &Html) -> Vec<ElementRef<'_>> {
    document
        .select(&LINK_SEL)
        .filter(|a| a.value().attr("href").is_some_and(|h| CATEGORY_HREF_RE.is_match(h)))
        .collect()
}
