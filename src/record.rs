use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Marketplaces with a scraper. Serialized as the snake_case tag stored in
/// each record's `marketplace` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marketplace {
    ShopifyAppStore,
    SalesforceAppexchange,
    MicrosoftAppsource,
    AcumaticaMarketplace,
    NetsuiteSuiteapp,
    HubspotMarketplace,
}

impl Marketplace {
    pub const ALL: [Marketplace; 6] = [
        Marketplace::ShopifyAppStore,
        Marketplace::SalesforceAppexchange,
        Marketplace::MicrosoftAppsource,
        Marketplace::AcumaticaMarketplace,
        Marketplace::NetsuiteSuiteapp,
        Marketplace::HubspotMarketplace,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Marketplace::ShopifyAppStore => "shopify_app_store",
            Marketplace::SalesforceAppexchange => "salesforce_appexchange",
            Marketplace::MicrosoftAppsource => "microsoft_appsource",
            Marketplace::AcumaticaMarketplace => "acumatica_marketplace",
            Marketplace::NetsuiteSuiteapp => "netsuite_suiteapp",
            Marketplace::HubspotMarketplace => "hubspot_marketplace",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Marketplace::ShopifyAppStore => "Shopify App Store",
            Marketplace::SalesforceAppexchange => "Salesforce AppExchange",
            Marketplace::MicrosoftAppsource => "Microsoft AppSource",
            Marketplace::AcumaticaMarketplace => "Acumatica Marketplace",
            Marketplace::NetsuiteSuiteapp => "NetSuite SuiteApp",
            Marketplace::HubspotMarketplace => "HubSpot Marketplace",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Marketplace {
    type Err = anyhow::Error;

    /// Accepts the full tag (`shopify_app_store`) or its first word (`shopify`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        Marketplace::ALL
            .into_iter()
            .find(|m| m.tag() == needle || m.tag().split('_').next() == Some(needle.as_str()))
            .ok_or_else(|| anyhow::anyhow!("unknown marketplace: {}", s))
    }
}

/// One normalized marketplace listing. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRecord {
    pub app_name: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_domain: Option<String>,
    pub vendor_website: Option<String>,
    pub vendor_email: Option<String>,
    pub vendor_location: Option<String>,
    pub app_url: String,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: u64,
    pub marketplace: Marketplace,
    pub scraped_at: String,
}

impl AppRecord {
    /// Empty record for `app_url`, stamped with the current UTC time.
    pub fn new(marketplace: Marketplace, app_url: impl Into<String>) -> Self {
        Self {
            app_name: None,
            vendor_name: None,
            vendor_domain: None,
            vendor_website: None,
            vendor_email: None,
            vendor_location: None,
            app_url: app_url.into(),
            description: None,
            categories: Vec::new(),
            rating: None,
            review_count: 0,
            marketplace,
            scraped_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn has_name(&self) -> bool {
        self.app_name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    /// Append a category unless it is empty or already present.
    pub fn push_category(&mut self, category: impl Into<String>) {
        let category = category.into();
        if !category.is_empty() && !self.categories.contains(&category) {
            self.categories.push(category);
        }
    }

    /// Keep only records with a usable name.
    pub fn into_named(self) -> Option<Self> {
        if self.has_name() {
            Some(self)
        } else {
            None
        }
    }
}
