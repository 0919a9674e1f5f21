//! HubSpot's marketplace is client-rendered. With the `browser` feature,
//! explore and detail pages are rendered in headless Chromium (waiting for
//! app links, then scrolling to load lazy cards). Without it, or when no
//! browser can be launched, pages are fetched as plain HTML and mined for
//! whatever the server already embeds (JSON-LD item lists, anchors, meta).

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use crate::browser::{HeadlessBrowser, RenderPlan};
use crate::config::ScrapeOptions;
use crate::parser::{html, json_ld, resolve};
use crate::pipeline::{self, PagePolicy, PageSource, ScrapeRun};
use crate::record::{AppRecord, Marketplace};

pub const BASE_URL: &str = "https://ecosystem.hubspot.com";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const RATE_LIMIT_DELAY: Duration = Duration::from_millis(1500);
const MAX_PAGES: usize = 35;
const LISTING_PATH: &str = "/marketplace/listing/";
const NOT_APP_PAGES: &[&str] = &[
    "/all-categories",
    "/popular",
    "/new",
    "/free",
    "/apps-for-",
    "/apps-built-for-",
    "/featured",
    "/cms",
    "/ecommerce",
    "/all",
];

static LISTING_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/marketplace/listing/"]"#).unwrap());
static APPS_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/marketplace/apps/"]"#).unwrap());
static VENDOR_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"[class*="vendor"]"#,
        r#"[class*="provider"]"#,
        r#"[class*="company"]"#,
        r#"[class*="author"]"#,
        r#"[data-testid*="vendor"]"#,
        r#"[data-testid*="provider"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});
static RATING_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [r#"[class*="rating"]"#, r#"[class*="stars"]"#, r#"[aria-label*="rating"]"#]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static CATEGORY_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"[class*="category"]"#,
        r#"[class*="tag"]"#,
        r#"a[href*="/marketplace/apps/"][href*="category"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

#[cfg(feature = "browser")]
pub async fn scrape(client: &reqwest::Client, opts: &ScrapeOptions) -> Result<ScrapeRun> {
    let browser = match HeadlessBrowser::launch(REQUEST_TIMEOUT).await {
        Ok(browser) => browser,
        Err(e) => {
            warn!("{:#}; falling back to static HTML", e);
            return scrape_with(client, client, BASE_URL, opts).await;
        }
    };
    let run = scrape_with(
        &browser.pages(explore_plan()),
        &browser.pages(detail_plan()),
        BASE_URL,
        opts,
    )
    .await;
    browser.close().await;
    run
}

#[cfg(not(feature = "browser"))]
pub async fn scrape(client: &reqwest::Client, opts: &ScrapeOptions) -> Result<ScrapeRun> {
    scrape_with(client, client, BASE_URL, opts).await
}

#[cfg(feature = "browser")]
fn explore_plan() -> RenderPlan {
    RenderPlan {
        timeout: REQUEST_TIMEOUT,
        ready_selector: Some(r#"a[href*="/marketplace/listing/"], a[href*="/marketplace/apps/"]"#),
        settle: Duration::from_secs(2),
        max_scrolls: 20,
    }
}

#[cfg(feature = "browser")]
fn detail_plan() -> RenderPlan {
    RenderPlan {
        timeout: REQUEST_TIMEOUT,
        ready_selector: Some("h1"),
        settle: Duration::from_secs(3),
        max_scrolls: 0,
    }
}

/// Discover from `listing` pages, then parse each app from `detail` pages.
pub async fn scrape_with<L, D>(listing: &L, detail: &D, base_url: &str, opts: &ScrapeOptions) -> Result<ScrapeRun>
where
    L: PageSource,
    D: PageSource,
{
    let urls = discover_urls(listing, base_url, opts).await;
    if urls.is_empty() {
        warn!("No app URLs discovered");
        return Ok(ScrapeRun::default());
    }
    info!("Scraping {} HubSpot listings", urls.len());

    pipeline::scrape_details(detail, &urls, RATE_LIMIT_DELAY, parse_app_page).await
}

pub async fn discover_urls<S: PageSource>(source: &S, base_url: &str, opts: &ScrapeOptions) -> Vec<String> {
    let explore = format!("{}/marketplace/explore?eco_PRODUCT_TYPE=APP", base_url);
    let pages: Vec<String> = (1..=MAX_PAGES)
        .map(|p| if p == 1 { explore.clone() } else { format!("{}&eco_page={}", explore, p) })
        .collect();

    let policy = PagePolicy {
        skip_failed_pages: true,
        tolerate_empty_first_page: true,
    };
    pipeline::discover_paginated(source, &pages, RATE_LIMIT_DELAY, opts, policy, |body| {
        app_links(body, base_url)
    })
    .await
}

/// Detail URLs on one explore page, from the JSON-LD item list first, then
/// `/marketplace/listing/` anchors, then legacy `/marketplace/apps/<slug>`
/// anchors.
fn app_links(body: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let mut urls: Vec<String> = Vec::new();
    let mut push = |url: String| {
        if !urls.contains(&url) {
            urls.push(url);
        }
    };

    for block in json_ld::extract_blocks(&document) {
        if block.get("@type").and_then(Value::as_str) != Some("ItemList") {
            continue;
        }
        let items = block.get("itemListElement").and_then(Value::as_array);
        for item in items.into_iter().flatten() {
            if let Some(id) = item.pointer("/item/@id").and_then(Value::as_str) {
                if id.contains(LISTING_PATH) {
                    push(id.to_string());
                }
            }
        }
    }

    for href in document.select(&LISTING_LINK_SEL).filter_map(|a| a.value().attr("href")) {
        if href.contains('?') || href.contains('#') {
            continue;
        }
        if let Some(url) = resolve(base_url, href) {
            push(url);
        }
    }

    for href in document.select(&APPS_LINK_SEL).filter_map(|a| a.value().attr("href")) {
        if href.contains('?') || href.contains('#') || NOT_APP_PAGES.iter().any(|p| href.contains(p)) {
            continue;
        }
        if !has_app_slug(href) {
            continue;
        }
        if let Some(url) = resolve(base_url, href) {
            push(url);
        }
    }

    debug!("Extracted {} app URLs from page", urls.len());
    urls
}

/// `.../apps/<slug>` with a non-empty segment after `apps`.
fn has_app_slug(href: &str) -> bool {
    let parts: Vec<&str> = href.trim_end_matches('/').split('/').collect();
    parts
        .iter()
        .position(|p| *p == "apps")
        .and_then(|i| parts.get(i + 1))
        .is_some_and(|slug| !slug.is_empty())
}

pub fn parse_app_page(page: &str, url: &str) -> Option<AppRecord> {
    let document = Html::parse_document(page);
    let mut record = AppRecord::new(Marketplace::HubspotMarketplace, url);

    record.app_name = html::first_text(&document, "h1")
        .or_else(|| html::title_without_site(&document, "HubSpot"));

    record.description = html::meta_description(&document)
        .or_else(|| html::meta_content(&document, "property", "og:description"));

    record.vendor_name = VENDOR_SELS
        .iter()
        .filter_map(|sel| document.select(sel).next())
        .map(html::text_of)
        .find(|t| !t.is_empty() && t.len() < 100)
        .or_else(|| html::vendor_by_pattern(page, 50));

    record.rating = RATING_SELS
        .iter()
        .filter_map(|sel| document.select(sel).next())
        .find_map(|el| html::rating_in_text(&html::text_of(el)));

    record.review_count = html::review_count(page).unwrap_or(0);

    for sel in CATEGORY_SELS.iter() {
        for label in html::labels(document.select(sel), 5, &[]) {
            record.push_category(label);
        }
    }

    if record.app_name.is_none() {
        warn!("Could not extract app name from {}", url);
    }
    record.into_named()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::http;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn links_from_item_list_and_anchors() {
        let body = r#"<html><head><script type="application/ld+json">
            {"@type":"ItemList","itemListElement":[
              {"item":{"@id":"https://ecosystem.hubspot.com/marketplace/listing/zoom"}},
              {"item":{"@id":"https://ecosystem.hubspot.com/marketplace/explore"}}]}
            </script></head><body>
            <a href="/marketplace/listing/zoom">Zoom</a>
            <a href="/marketplace/listing/slack">Slack</a>
            <a href="/marketplace/listing/slack?tab=reviews">Slack reviews</a>
            <a href="/marketplace/apps/sales/gong">Gong</a>
            <a href="/marketplace/apps/popular">Popular</a>
            <a href="/marketplace/apps/">Apps</a>
            </body></html>"#;
        assert_eq!(
            app_links(body, BASE_URL),
            vec![
                "https://ecosystem.hubspot.com/marketplace/listing/zoom",
                "https://ecosystem.hubspot.com/marketplace/listing/slack",
                "https://ecosystem.hubspot.com/marketplace/apps/sales/gong",
            ]
        );
    }

    #[test]
    fn app_slug_detection() {
        assert!(has_app_slug("/marketplace/apps/marketing/mailchimp"));
        assert!(!has_app_slug("/marketplace/apps/"));
        assert!(!has_app_slug("/marketplace/listing/x"));
    }

    #[test]
    fn parses_detail_page() {
        let page = r#"<html><head><title>Zoom | HubSpot App Marketplace</title>
            <meta property="og:description" content="Video meetings in HubSpot"></head><body>
            <div class="listing-provider-name">Zoom Video Communications</div>
            <span aria-label="rating 4.6 of 5">4.6</span><p>312 reviews</p>
            <a class="category-pill" href="/marketplace/apps/video">Video</a>
            <span class="tag-chip">Meetings</span></body></html>"#;
        let rec = parse_app_page(page, "https://ecosystem.hubspot.com/marketplace/listing/zoom").unwrap();
        assert_eq!(rec.app_name.as_deref(), Some("Zoom"));
        assert_eq!(rec.description.as_deref(), Some("Video meetings in HubSpot"));
        assert_eq!(rec.vendor_name.as_deref(), Some("Zoom Video Communications"));
        assert_eq!(rec.rating, Some(4.6));
        assert_eq!(rec.review_count, 312);
        assert_eq!(rec.categories, vec!["Video", "Meetings"]);
        assert_eq!(rec.marketplace, Marketplace::HubspotMarketplace);
    }

    #[test]
    fn shell_page_without_name_is_dropped() {
        assert!(parse_app_page("<html><body><div id=\"root\"></div></body></html>", "u").is_none());
    }

    #[tokio::test]
    async fn failed_and_empty_pages_do_not_end_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/marketplace/explore"))
            .and(query_param("eco_page", "2"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/marketplace/explore"))
            .and(query_param("eco_page", "3"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<a href="/marketplace/listing/a">a</a>"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/marketplace/explore"))
            .and(query_param("eco_page", "4"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<a href="/marketplace/listing/a">a</a>"#),
            )
            .mount(&server)
            .await;
        // Page 1 renders client-side and comes back without links.
        Mock::given(method("GET"))
            .and(path("/marketplace/explore"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<div id=\"root\"></div>"))
            .mount(&server)
            .await;

        let client = http::browser_client(Duration::from_secs(5)).unwrap();
        let urls = discover_urls(&client, &server.uri(), &ScrapeOptions::default()).await;
        assert_eq!(urls, vec![format!("{}/marketplace/listing/a", server.uri())]);
    }

    /// Rendered pages keyed by URL.
    struct Rendered(HashMap<String, String>);

    impl PageSource for Rendered {
        async fn fetch_page(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("not rendered: {}", url))
        }
    }

    #[tokio::test]
    async fn scrapes_from_rendered_pages() {
        let explore = format!("{}/marketplace/explore?eco_PRODUCT_TYPE=APP", BASE_URL);
        let listing = Rendered(HashMap::from([(
            explore,
            r#"<div class="card"><a href="/marketplace/listing/zoom">Zoom</a></div>"#.to_string(),
        )]));
        let detail = Rendered(HashMap::from([(
            format!("{}/marketplace/listing/zoom", BASE_URL),
            "<html><body><h1>Zoom</h1><p>27 reviews</p></body></html>".to_string(),
        )]));

        let run = scrape_with(&listing, &detail, BASE_URL, &ScrapeOptions::default()).await.unwrap();
        assert_eq!(run.records.len(), 1);
        assert_eq!(run.records[0].app_name.as_deref(), Some("Zoom"));
        assert_eq!(run.records[0].review_count, 27);
        assert_eq!(run.stats.total, 1);
    }

    #[cfg(feature = "browser")]
    #[test]
    fn render_plans_wait_on_valid_selectors() {
        for plan in [explore_plan(), detail_plan()] {
            let selector = plan.ready_selector.unwrap();
            assert!(Selector::parse(selector).is_ok(), "{}", selector);
        }
        assert!(explore_plan().max_scrolls > 0);
    }
}
