use url::Url;

/// Host of `url` without a leading `www.`. Bare hosts such as
/// `example.com/path` are accepted too.
pub fn extract_domain(url: Option<&str>) -> Option<String> {
    let url = url?.trim();
    if url.is_empty() {
        return None;
    }

    let host = match Url::parse(url) {
        Ok(parsed) => parsed.host_str().map(str::to_string),
        Err(_) => url.split('/').next().map(str::to_string),
    }?;

    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Resolve `href` against `base`, like a browser following a link.
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_www_and_path() {
        assert_eq!(extract_domain(Some("https://www.klaviyo.com/about?x=1")).as_deref(), Some("klaviyo.com"));
        assert_eq!(extract_domain(Some("http://sub.acme.io")).as_deref(), Some("sub.acme.io"));
    }

    #[test]
    fn bare_host() {
        assert_eq!(extract_domain(Some("www.celigo.com/integrations")).as_deref(), Some("celigo.com"));
    }

    #[test]
    fn missing_or_empty() {
        assert_eq!(extract_domain(None), None);
        assert_eq!(extract_domain(Some("")), None);
        assert_eq!(extract_domain(Some("mailto:sales@acme.com")), None);
    }

    #[test]
    fn resolve_relative() {
        assert_eq!(
            resolve("https://marketplace.acumatica.com/listings", "/listing/foo").as_deref(),
            Some("https://marketplace.acumatica.com/listing/foo")
        );
        assert_eq!(
            resolve("https://a.example/x", "https://b.example/y").as_deref(),
            Some("https://b.example/y")
        );
    }
}
