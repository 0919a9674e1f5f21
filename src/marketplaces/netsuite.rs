use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::config::ScrapeOptions;
use crate::parser::{extract_domain, html, resolve};
use crate::pipeline::{self, PagePolicy, ScrapeRun};
use crate::record::{AppRecord, Marketplace};

pub const BASE_URL: &str = "https://www.suiteapp.com";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const RATE_LIMIT_DELAY: Duration = Duration::from_millis(1500);
const MAX_PAGES: usize = 100;
const DESCRIPTION_MAX_CHARS: usize = 500;

/// Single-segment paths that are site chrome rather than apps.
const NAV_PATHS: &[&str] = &[
    "/search", "/login", "/register", "/about", "/contact", "/privacy", "/terms", "/help", "/faq",
    "/blog", "/partner", "/vendor", "/admin", "/category",
];

static TOP_LEVEL_HREF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/[^/]+$").unwrap());
static CARD_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)app|product|listing|result").unwrap());
static DESCRIPTION_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)description|summary|overview").unwrap());
static VENDOR_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)vendor|developer|company|partner|provider").unwrap());
static CATEGORY_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)category|tag|badge").unwrap());
static CATEGORY_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/category/|/tag/|category=").unwrap());
static RATING_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)rating|stars|score").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

pub async fn scrape(client: &reqwest::Client, opts: &ScrapeOptions) -> Result<ScrapeRun> {
    let urls = discover_urls(client, BASE_URL, opts).await;
    if urls.is_empty() {
        warn!("No app URLs discovered");
        return Ok(ScrapeRun::default());
    }
    info!("Scraping {} SuiteApp listings", urls.len());

    pipeline::scrape_details(client, &urls, RATE_LIMIT_DELAY, parse_app_page).await
}

pub async fn discover_urls(client: &reqwest::Client, base_url: &str, opts: &ScrapeOptions) -> Vec<String> {
    let pages: Vec<String> = (1..=MAX_PAGES)
        .map(|p| format!("{}/search?page={}&sort=name", base_url, p))
        .collect();

    pipeline::discover_paginated(
        client,
        &pages,
        RATE_LIMIT_DELAY,
        opts,
        PagePolicy::default(),
        |body| search_result_links(body, base_url),
    )
    .await
}

/// App links on one search page. Apps live at top-level paths (`/<slug>`),
/// so those are taken minus the site's own navigation, plus the first link of
/// any result card.
fn search_result_links(body: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(body);

    let mut hrefs: Vec<String> = html::hrefs_matching(&document, &TOP_LEVEL_HREF_RE)
        .into_iter()
        .filter(|h| {
            let lower = h.to_lowercase();
            !NAV_PATHS.iter().any(|nav| lower.contains(nav))
        })
        .collect();

    hrefs.extend(
        html::with_class(&document, &CARD_CLASS_RE)
            .into_iter()
            .filter_map(html::first_link)
            .filter_map(|a| a.value().attr("href"))
            .filter(|h| h.starts_with('/') && h.matches('/').count() == 1)
            .map(str::to_string),
    );

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
    let mut record = AppRecord::new(Marketplace::NetsuiteSuiteapp, url);

    record.app_name = html::first_text(&document, "h1")
        .or_else(|| html::title_without_site(&document, "SuiteApp"));

    record.description = html::meta_description(&document).or_else(|| {
        html::with_class(&document, &DESCRIPTION_CLASS_RE)
            .into_iter()
            .next()
            .map(|el| html::truncate_chars(&html::text_of(el), DESCRIPTION_MAX_CHARS))
            .filter(|d| !d.is_empty())
    });

    if let Some((name, website)) = html::vendor_from_element(&document, &VENDOR_CLASS_RE, None) {
        record.vendor_name = Some(name);
        record.vendor_domain = extract_domain(website.as_deref());
        record.vendor_website = website;
    }
    if record.vendor_name.is_none() {
        record.vendor_name = html::vendor_by_pattern(page, 100);
    }

    for label in html::labels(html::with_class(&document, &CATEGORY_CLASS_RE), 10, &[]) {
        record.push_category(label);
    }
    for label in html::labels(category_links(&document), 5, &[]) {
        record.push_category(label);
    }

    record.rating = html::rating_from_elements(&document, &RATING_CLASS_RE);
    record.review_count = html::review_count(page).unwrap_or(0);

    record.into_named()
}

fn category_links(document: &Html) -> Vec<ElementRef<'_>> {
    document
        .select(&LINK_SEL)
        .filter(|a| a.value().attr("href").is_some_and(|h| CATEGORY_HREF_RE.is_match(h)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn search_links_skip_navigation() {
        let body = r#"<nav><a href="/login">Login</a><a href="/search">Search</a>
            <a href="/category">All</a></nav>
            <a href="/celigo-integrator">Celigo</a>
            <div class="app-tile"><a href="/avalara-avatax">Avalara</a></div>
            <div class="result"><a href="/vendors/acme/apps">nested</a></div>
            <a href="/celigo-integrator">Celigo again</a>"#;
        assert_eq!(
            search_result_links(body, BASE_URL),
            vec![
                "https://www.suiteapp.com/celigo-integrator",
                "https://www.suiteapp.com/avalara-avatax",
            ]
        );
    }

    #[test]
    fn parses_detail_page() {
        let page = r#"<html><head><title>Celigo Integrator.io - SuiteApp.com</title>
            <meta name="description" content="iPaaS for NetSuite"></head><body>
            <div class="developer-info"><a href="https://www.celigo.com">Celigo, Inc.</a></div>
            <span class="tag">Integration</span><span class="tag">Integration</span>
            <a href="/search?category=ecommerce">Ecommerce</a>
            <div class="rating-value">4.7</div><p>1,204 reviews</p></body></html>"#;
        let rec = parse_app_page(page, "https://www.suiteapp.com/celigo-integrator").unwrap();
        assert_eq!(rec.app_name.as_deref(), Some("Celigo Integrator.io"));
        assert_eq!(rec.description.as_deref(), Some("iPaaS for NetSuite"));
        assert_eq!(rec.vendor_name.as_deref(), Some("Celigo, Inc."));
        assert_eq!(rec.vendor_website.as_deref(), Some("https://www.celigo.com"));
        assert_eq!(rec.vendor_domain.as_deref(), Some("celigo.com"));
        assert_eq!(rec.categories, vec!["Integration", "Ecommerce"]);
        assert_eq!(rec.rating, Some(4.7));
        assert_eq!(rec.review_count, 1204);
        assert_eq!(rec.marketplace, Marketplace::NetsuiteSuiteapp);
    }

    #[test]
    fn vendor_from_by_line() {
        let page = "<html><body><h1>Tax Sync</h1>\n<p>Built by Acme Tax Partners\n</p></body></html>";
        let rec = parse_app_page(page, "u").unwrap();
        assert_eq!(rec.vendor_name.as_deref(), Some("Acme Tax Partners"));
        assert_eq!(rec.review_count, 0);
        assert!(rec.rating.is_none());
    }

    #[test]
    fn nameless_page_is_dropped() {
        assert!(parse_app_page("<html><body><p>Not found</p></body></html>", "u").is_none());
    }

    #[tokio::test]
    async fn stops_on_first_failed_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/app-one">1</a>"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/app-three">3</a>"#))
            .expect(0)
            .mount(&server)
            .await;

        let client = http::browser_client(Duration::from_secs(5)).unwrap();
        let urls = discover_urls(&client, &server.uri(), &ScrapeOptions::default()).await;
        assert_eq!(urls, vec![format!("{}/app-one", server.uri())]);
    }
}
