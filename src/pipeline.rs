use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::config::ScrapeOptions;
use crate::http;
use crate::record::AppRecord;

const LOG_INTERVAL: usize = 50;

/// Detail-scrape stats returned after completion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapeStats {
    pub total: usize,
    pub ok: usize,
    /// Pages that fetched fine but yielded no named app.
    pub empty: usize,
    pub errors: usize,
}

/// Records from one marketplace run and how its detail pages fared.
#[derive(Debug, Default)]
pub struct ScrapeRun {
    pub records: Vec<AppRecord>,
    pub stats: ScrapeStats,
}

impl ScrapeRun {
    /// A run whose records came straight from structured data, with no
    /// per-page fetches: every candidate either parsed or was empty.
    pub fn from_parsed(candidates: usize, records: Vec<AppRecord>) -> Self {
        let stats = ScrapeStats {
            total: candidates,
            ok: records.len(),
            empty: candidates.saturating_sub(records.len()),
            errors: 0,
        };
        Self { records, stats }
    }
}

/// Something that turns a URL into page HTML: a plain HTTP client, or a
/// headless browser for client-rendered sites.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

impl PageSource for reqwest::Client {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        http::fetch_text(self, url).await
    }
}

/// Fetch each URL in order, one at a time, pausing `delay` between requests
/// (not after the last), and parse every page with `parse(html, url)`.
///
/// A failed fetch or an unusable page is logged and skipped.
pub async fn scrape_details<S, F>(source: &S, urls: &[String], delay: Duration, parse: F) -> Result<ScrapeRun>
where
    S: PageSource,
    F: Fn(&str, &str) -> Option<AppRecord>,
{
    let total = urls.len();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut records = Vec::new();
    let mut stats = ScrapeStats {
        total,
        ..Default::default()
    };

    for (i, url) in urls.iter().enumerate() {
        match source.fetch_page(url).await {
            Ok(html) => match parse(&html, url) {
                Some(record) => {
                    stats.ok += 1;
                    records.push(record);
                }
                None => {
                    stats.empty += 1;
                    warn!("No app data found: {}", url);
                }
            },
            Err(e) => {
                stats.errors += 1;
                warn!("Request failed for {}: {:#}", url, e);
            }
        }
        pb.inc(1);

        let done = i + 1;
        if done % LOG_INTERVAL == 0 {
            info!(
                "Progress: {}/{} URLs processed, {} successful",
                done,
                total,
                records.len()
            );
        }
        if done < total {
            tokio::time::sleep(delay).await;
        }
    }

    pb.finish_and_clear();
    info!(
        "Scraping complete: {}/{} listings extracted ({} empty, {} errors)",
        stats.ok, total, stats.empty, stats.errors
    );
    Ok(ScrapeRun { records, stats })
}

/// How listing pagination reacts to bad pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PagePolicy {
    /// Keep paging past a page that failed to load (otherwise stop).
    pub skip_failed_pages: bool,
    /// A first page with no URLs does not end pagination (client-rendered
    /// listings sometimes come up empty once).
    pub tolerate_empty_first_page: bool,
}

/// Walk `pages` in order collecting unique detail URLs with `extract(body)`.
/// Stops at the first page that adds nothing new, or once `opts.limit` URLs
/// are known.
pub async fn discover_paginated<S, F>(
    source: &S,
    pages: &[String],
    delay: Duration,
    opts: &ScrapeOptions,
    policy: PagePolicy,
    extract: F,
) -> Vec<String>
where
    S: PageSource,
    F: Fn(&str) -> Vec<String>,
{
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for (i, page_url) in pages.iter().enumerate() {
        let page_num = i + 1;
        info!("Fetching page {}/{}: {}", page_num, pages.len(), page_url);

        let body = match source.fetch_page(page_url).await {
            Ok(body) => body,
            Err(e) if policy.skip_failed_pages => {
                warn!("Failed to load page {}: {:#}", page_num, e);
                continue;
            }
            Err(e) => {
                error!("Failed to fetch page {}: {:#}", page_num, e);
                break;
            }
        };

        let new_urls: Vec<String> = extract(&body)
            .into_iter()
            .filter(|u| seen.insert(u.clone()))
            .collect();

        if new_urls.is_empty() {
            if page_num == 1 && policy.tolerate_empty_first_page {
                warn!("No URLs found on first page");
            } else {
                info!("No new URLs found on page {}, stopping pagination", page_num);
                break;
            }
        }

        urls.extend(new_urls);
        info!("Page {}: {} URLs so far", page_num, urls.len());

        if opts.limit_reached(urls.len()) {
            info!("Reached limit of {} URLs", urls.len());
            break;
        }
        if page_num < pages.len() {
            tokio::time::sleep(delay).await;
        }
    }

    opts.truncate(&mut urls);
    info!("Discovered {} total app URLs", urls.len());
    urls
}
