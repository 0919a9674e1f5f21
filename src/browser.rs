//! Headless Chromium for marketplaces that only render listings client-side.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pipeline::PageSource;

const SCROLL_HEIGHT_JS: &str = "document.body.scrollHeight";
const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.body.scrollHeight)";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SCROLL_PAUSE: Duration = Duration::from_secs(1);

/// How to decide a page has finished rendering.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    /// Navigation budget, also the max wait for `ready_selector`.
    pub timeout: Duration,
    /// Wait until this selector matches (best-effort; a miss is not an error).
    pub ready_selector: Option<&'static str>,
    /// Extra time for late content after the page is ready.
    pub settle: Duration,
    /// Scroll to the bottom up to this many times to trigger lazy loading.
    pub max_scrolls: usize,
}

pub struct HeadlessBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl HeadlessBrowser {
    pub async fn launch(request_timeout: Duration) -> Result<Self> {
        let config = BrowserConfig::builder()
            .request_timeout(request_timeout)
            .window_size(1920, 1080)
            .build()
            .map_err(anyhow::Error::msg)?;
        let (browser, mut events) = Browser::launch(config)
            .await
            .context("Failed to launch headless Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        info!("Headless browser started");
        Ok(Self { browser, handler })
    }

    /// A page source that renders every URL according to `plan`.
    pub fn pages(&self, plan: RenderPlan) -> RenderedPages<'_> {
        RenderedPages { browser: self, plan }
    }

    async fn render(&self, url: &str, plan: &RenderPlan) -> Result<String> {
        let page = self.browser.new_page("about:blank").await?;
        let html = render_in(&page, url, plan).await;
        if let Err(e) = page.close().await {
            debug!("Failed to close tab for {}: {}", url, e);
        }
        html
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

async fn render_in(page: &Page, url: &str, plan: &RenderPlan) -> Result<String> {
    tokio::time::timeout(plan.timeout, page.goto(url))
        .await
        .with_context(|| format!("Timed out loading {}", url))?
        .with_context(|| format!("Failed to load {}", url))?;

    if let Some(selector) = plan.ready_selector {
        if !wait_for_selector(page, selector, plan.timeout).await {
            debug!("{} never matched on {}", selector, url);
        }
    }
    tokio::time::sleep(plan.settle).await;

    for _ in 0..plan.max_scrolls {
        let before: u64 = page.evaluate(SCROLL_HEIGHT_JS).await?.into_value()?;
        page.evaluate(SCROLL_TO_BOTTOM_JS).await?;
        tokio::time::sleep(SCROLL_PAUSE).await;
        let after: u64 = page.evaluate(SCROLL_HEIGHT_JS).await?.into_value()?;
        if after == before {
            break;
        }
    }

    page.content()
        .await
        .with_context(|| format!("Failed to read rendered HTML of {}", url))
}

async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if page.find_element(selector).await.is_ok() {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    false
}

pub struct RenderedPages<'a> {
    browser: &'a HeadlessBrowser,
    plan: RenderPlan,
}

impl PageSource for RenderedPages<'_> {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.browser.render(url, &self.plan).await
    }
}
