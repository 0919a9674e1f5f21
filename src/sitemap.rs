use anyhow::{Context, Result};
use quick_xml::events::Event;
use tracing::info;

use crate::http;

/// Fetch a `<urlset>` sitemap and return all `<loc>` URLs.
pub async fn fetch_urlset(client: &reqwest::Client, url: &str) -> Result<Vec<String>> {
    info!("Fetching sitemap: {}", url);
    let xml = http::fetch_text(client, url)
        .await
        .context("Failed to fetch sitemap")?;
    let urls = parse_urlset(&xml)?;
    info!("Total URLs in sitemap: {}", urls.len());
    Ok(urls)
}

/// Fetch a `<sitemapindex>` and return the child sitemap URLs.
pub async fn fetch_sitemap_index(client: &reqwest::Client, url: &str) -> Result<Vec<String>> {
    info!("Fetching sitemap index: {}", url);
    let xml = http::fetch_text(client, url)
        .await
        .context("Failed to fetch sitemap index")?;
    let sitemaps = parse_sitemap_index(&xml)?;
    info!("Found {} child sitemaps", sitemaps.len());
    Ok(sitemaps)
}

/// Parse a urlset XML and return all <url><loc> URLs.
pub fn parse_urlset(xml: &str) -> Result<Vec<String>> {
    parse_locs(xml, b"url")
}

/// Parse a sitemapindex XML and return all <sitemap><loc> URLs.
pub fn parse_sitemap_index(xml: &str) -> Result<Vec<String>> {
    parse_locs(xml, b"sitemap")
}

// Matches on local names so both prefixed and default-namespace documents work.
fn parse_locs(xml: &str, parent: &[u8]) -> Result<Vec<String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut locs = Vec::new();
    let mut in_parent = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                name if name == parent => in_parent = true,
                b"loc" if in_parent => in_loc = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_loc => {
                let text = e.unescape()?;
                let text = text.trim();
                if !text.is_empty() {
                    locs.push(text.to_string());
                }
            }
            Ok(Event::CData(e)) if in_loc => {
                let text = String::from_utf8_lossy(&e).trim().to_string();
                if !text.is_empty() {
                    locs.push(text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = false,
                name if name == parent => in_parent = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(locs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://apps.shopify.com/klaviyo-email-marketing</loc><lastmod>2024-01-01</lastmod></url>
  <url>
    <loc>
      https://apps.shopify.com/judgeme?a=1&amp;b=2
    </loc>
  </url>
</urlset>"#;

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://apps.shopify.com/sitemap_1.xml</loc></sitemap>
  <sitemap><loc>https://apps.shopify.com/sitemap_2.xml</loc></sitemap>
</sitemapindex>"#;

    #[test]
    fn urlset_locs() {
        let urls = parse_urlset(URLSET).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://apps.shopify.com/klaviyo-email-marketing",
                "https://apps.shopify.com/judgeme?a=1&b=2",
            ]
        );
    }

    #[test]
    fn index_locs() {
        let urls = parse_sitemap_index(INDEX).unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls[1].ends_with("sitemap_2.xml"));
    }

    #[test]
    fn index_is_not_a_urlset() {
        assert!(parse_urlset(INDEX).unwrap().is_empty());
        assert!(parse_sitemap_index(URLSET).unwrap().is_empty());
    }

    #[test]
    fn prefixed_namespace() {
        let xml = r#"<s:urlset xmlns:s="http://www.sitemaps.org/schemas/sitemap/0.9"><s:url><s:loc>https://a.example/x</s:loc></s:url></s:urlset>"#;
        assert_eq!(parse_urlset(xml).unwrap(), vec!["https://a.example/x"]);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_urlset("<urlset><url><loc>x</url></urlset>").is_err());
    }
}
