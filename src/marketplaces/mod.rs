pub mod acumatica;
pub mod appsource;
pub mod hubspot;
pub mod netsuite;
pub mod salesforce;
pub mod shopify;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::ScrapeOptions;
use crate::http;
use crate::pipeline::ScrapeRun;
use crate::record::Marketplace;

impl Marketplace {
    /// Where scraping for this marketplace starts.
    pub fn base_url(self) -> &'static str {
        match self {
            Marketplace::ShopifyAppStore => shopify::SITEMAP_INDEX_URL,
            Marketplace::SalesforceAppexchange => salesforce::SITEMAP_URL,
            Marketplace::MicrosoftAppsource => appsource::BASE_URL,
            Marketplace::AcumaticaMarketplace => acumatica::BASE_URL,
            Marketplace::NetsuiteSuiteapp => netsuite::BASE_URL,
            Marketplace::HubspotMarketplace => hubspot::BASE_URL,
        }
    }

    pub fn request_timeout(self) -> Duration {
        match self {
            Marketplace::ShopifyAppStore => shopify::REQUEST_TIMEOUT,
            Marketplace::SalesforceAppexchange => salesforce::REQUEST_TIMEOUT,
            Marketplace::MicrosoftAppsource => appsource::REQUEST_TIMEOUT,
            Marketplace::AcumaticaMarketplace => acumatica::REQUEST_TIMEOUT,
            Marketplace::NetsuiteSuiteapp => netsuite::REQUEST_TIMEOUT,
            Marketplace::HubspotMarketplace => hubspot::REQUEST_TIMEOUT,
        }
    }
}

/// Run the full discover + detail scrape for one marketplace.
pub async fn scrape(marketplace: Marketplace, opts: &ScrapeOptions) -> Result<ScrapeRun> {
    info!("Starting {} scraper", marketplace.display_name());
    match opts.limit {
        Some(n) => info!("Scrape limit: {}", n),
        None => info!("Scrape limit: unlimited"),
    }

    let client = http::browser_client(marketplace.request_timeout())?;
    let run = match marketplace {
        Marketplace::ShopifyAppStore => shopify::scrape(&client, opts).await,
        Marketplace::SalesforceAppexchange => salesforce::scrape(&client, opts).await,
        Marketplace::MicrosoftAppsource => appsource::scrape(&client, opts).await,
        Marketplace::AcumaticaMarketplace => acumatica::scrape(&client, opts).await,
        Marketplace::NetsuiteSuiteapp => netsuite::scrape(&client, opts).await,
        Marketplace::HubspotMarketplace => hubspot::scrape(&client, opts).await,
    }
    .with_context(|| format!("{} scrape failed", marketplace.display_name()))?;

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_marketplace_has_settings() {
        for m in Marketplace::ALL {
            assert!(m.base_url().starts_with("https://"));
            assert!(m.request_timeout() >= Duration::from_secs(5));
        }
    }
}
