use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use serde::de::DeserializeOwned;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Client that looks like a desktop browser. Marketplaces serve stripped or
/// blocked pages to the default reqwest user agent.
pub fn browser_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// GET `url` and return the body, failing on non-2xx.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("GET {} returned an error status", url))?
        .text()
        .await
        .with_context(|| format!("Failed to read body of {}", url))
}

/// GET `url` with `query` and decode the JSON body, failing on non-2xx.
pub async fn fetch_json<T, Q>(client: &reqwest::Client, url: &str, query: &Q) -> Result<T>
where
    T: DeserializeOwned,
    Q: serde::Serialize + ?Sized,
{
    client
        .get(url)
        .query(query)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("GET {} returned an error status", url))?
        .json::<T>()
        .await
        .with_context(|| format!("Invalid JSON from {}", url))
}
