//! Selector and text heuristics shared by the HTML-only marketplaces.
//!
//! Listing pages are unversioned third-party markup, so every helper here
//! returns `None`/empty on a miss and callers chain fallbacks.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());
static REVIEW_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:,\d{3})*)\s*(?:reviews?|ratings?)\b").unwrap());
static BY_VENDOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:developed by|published by|by|from)\s+([A-Z][A-Za-z0-9\s&.,]+?)(?:<|\n|$)").unwrap()
});
static CLASSED_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[class]").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Max length for a category/tag label.
pub const MAX_LABEL_LEN: usize = 50;

/// Visible text with whitespace runs collapsed.
pub fn text_of(el: ElementRef) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Text of the first element matching `selector`, if non-empty.
pub fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .map(text_of)
        .find(|t| !t.is_empty())
}

pub fn meta_content(document: &Html, attr_name: &str, attr_value: &str) -> Option<String> {
    let selector = Selector::parse(&format!("meta[{}='{}']", attr_name, attr_value)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn meta_description(document: &Html) -> Option<String> {
    meta_content(document, "name", "description")
}

/// `<title>` with a trailing " - Site…" / " | Site…" / " – Site…" removed.
pub fn title_without_site(document: &Html, site: &str) -> Option<String> {
    let title = first_text(document, "title")?;
    let stripped = strip_site_suffix(&title, site);
    Some(stripped).filter(|t| !t.is_empty())
}

pub fn strip_site_suffix(title: &str, site: &str) -> String {
    let pattern = format!(r"(?i)\s*[-–|]\s*{}.*$", regex::escape(site));
    match Regex::new(&pattern) {
        Ok(re) => re.replace(title, "").trim().to_string(),
        Err(_) => title.trim().to_string(),
    }
}

/// Elements carrying at least one class matched by `class_re`, in document order.
pub fn with_class<'a>(document: &'a Html, class_re: &Regex) -> Vec<ElementRef<'a>> {
    document
        .select(&CLASSED_SEL)
        .filter(|el| el.value().classes().any(|c| class_re.is_match(c)))
        .collect()
}

/// First `<a href>` inside `el`.
pub fn first_link(el: ElementRef) -> Option<ElementRef> {
    el.select(&LINK_SEL).next()
}

/// All `href`s on the page matching `href_re`, in document order.
pub fn hrefs_matching(document: &Html, href_re: &Regex) -> Vec<String> {
    document
        .select(&LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter(|h| href_re.is_match(h))
        .map(str::to_string)
        .collect()
}

/// First number in `text` when it falls in the 0–5 star range.
pub fn rating_in_text(text: &str) -> Option<f64> {
    let caps = NUMBER_RE.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    (0.0..=5.0).contains(&value).then_some(value)
}

/// First rating-classed element whose text holds a 0–5 number.
pub fn rating_from_elements(document: &Html, class_re: &Regex) -> Option<f64> {
    with_class(document, class_re)
        .into_iter()
        .find_map(|el| rating_in_text(&text_of(el)))
}

/// "1,204 reviews" / "87 ratings" anywhere in the raw page.
pub fn review_count(html: &str) -> Option<u64> {
    let caps = REVIEW_COUNT_RE.captures(html)?;
    caps[1].replace(',', "").parse().ok()
}

/// Vendor from free text such as "by Acme Corp" or "Published by Acme".
pub fn vendor_by_pattern(html: &str, max_len: usize) -> Option<String> {
    let caps = BY_VENDOR_RE.captures(html)?;
    let vendor = caps[1].trim();
    (!vendor.is_empty() && vendor.len() < max_len).then(|| vendor.to_string())
}

/// Short, distinct label texts from `elements`, skipping `ignore` (case-insensitive).
pub fn labels<'a>(elements: impl IntoIterator<Item = ElementRef<'a>>, max: usize, ignore: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for el in elements.into_iter().take(max) {
        let text = text_of(el);
        if text.is_empty() || text.len() >= MAX_LABEL_LEN || out.contains(&text) {
            continue;
        }
        if ignore.iter().any(|i| i.eq_ignore_ascii_case(&text)) {
            continue;
        }
        out.push(text);
    }
    out
}

/// Vendor from the first element classed like `class_re`: the text of its
/// first link (with an absolute href as website, unless it points at
/// `own_host`), or the element's own text.
pub fn vendor_from_element(
    document: &Html,
    class_re: &Regex,
    own_host: Option<&str>,
) -> Option<(String, Option<String>)> {
    let el = with_class(document, class_re).into_iter().next()?;
    let found = match first_link(el) {
        Some(link) => {
            let name = text_of(link);
            let website = link
                .value()
                .attr("href")
                .filter(|h| h.starts_with("http") && own_host.map_or(true, |host| !h.contains(host)))
                .map(str::to_string);
            (name, website)
        }
        None => (text_of(el), None),
    };
    Some(found).filter(|(name, _)| !name.is_empty())
}

/// Short labels under the parent of the first text node matching `heading_re`
/// (e.g. an "Industries" caption followed by a list of tags).
pub fn labels_near_text(document: &Html, heading_re: &Regex, max: usize) -> Vec<String> {
    static ITEM_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span, a, li").unwrap());

    let parent = document
        .root_element()
        .descendants()
        .find(|n| n.value().as_text().is_some_and(|t| heading_re.is_match(t)))
        .and_then(|n| n.parent())
        .and_then(ElementRef::wrap);
    match parent {
        Some(parent) => labels(parent.select(&ITEM_SEL), max, &[]),
        None => Vec::new(),
    }
}

/// At most `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title>Avalara AvaTax - Acumatica Marketplace</title>
        <meta content="Automated sales tax" name="description">
        </head><body>
        <h1>  Avalara
              AvaTax </h1>
        <div class="vendor-info"><a href="https://www.avalara.com">Avalara</a></div>
        <span class="tag">Tax</span><span class="tag">Tax</span><span class="badge">View</span>
        <span class="tag">Finance</span>
        <div class="star-rating">Rated 4.5 out of 5</div>
        <p>1,204 reviews</p>
        </body></html>"#;

    #[test]
    fn title_and_meta() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(title_without_site(&doc, "Acumatica").as_deref(), Some("Avalara AvaTax"));
        assert_eq!(meta_description(&doc).as_deref(), Some("Automated sales tax"));
        assert_eq!(first_text(&doc, "h1").as_deref(), Some("Avalara AvaTax"));
    }

    #[test]
    fn suffix_variants() {
        assert_eq!(strip_site_suffix("Foo | HubSpot Ecosystem", "HubSpot"), "Foo");
        assert_eq!(strip_site_suffix("Foo – SuiteApp.com", "SuiteApp"), "Foo");
        assert_eq!(strip_site_suffix("Foo", "SuiteApp"), "Foo");
    }

    #[test]
    fn classed_elements_and_links() {
        let doc = Html::parse_document(PAGE);
        let vendor_re = Regex::new(r"(?i)vendor").unwrap();
        let vendor = with_class(&doc, &vendor_re);
        assert_eq!(vendor.len(), 1);
        let link = first_link(vendor[0]).unwrap();
        assert_eq!(link.value().attr("href"), Some("https://www.avalara.com"));
        assert_eq!(text_of(link), "Avalara");
    }

    #[test]
    fn label_filtering() {
        let doc = Html::parse_document(PAGE);
        let re = Regex::new(r"(?i)tag|badge").unwrap();
        let got = labels(with_class(&doc, &re), 10, &["view"]);
        assert_eq!(got, vec!["Tax", "Finance"]);
    }

    #[test]
    fn rating_and_reviews() {
        let doc = Html::parse_document(PAGE);
        let re = Regex::new(r"(?i)rating|stars|score").unwrap();
        assert_eq!(rating_from_elements(&doc, &re), Some(4.5));
        assert_eq!(rating_in_text("12 of 10"), None);
        assert_eq!(review_count(PAGE), Some(1204));
        assert_eq!(review_count("no feedback yet"), None);
    }

    #[test]
    fn vendor_text() {
        assert_eq!(vendor_by_pattern("<p>Built by Acme Corp</p>", 100).as_deref(), Some("Acme Corp"));
        assert_eq!(vendor_by_pattern("Developed by Nova Labs\nmore", 100).as_deref(), Some("Nova Labs"));
        assert_eq!(vendor_by_pattern("nearby Something<", 100), None);
        assert_eq!(vendor_by_pattern("by lowercase<", 100), None);
        assert_eq!(vendor_by_pattern("by Averyveryverylongname<", 10), None);
    }

    #[test]
    fn vendor_element_variants() {
        let doc = Html::parse_document(PAGE);
        let re = Regex::new(r"(?i)vendor|developer").unwrap();
        let (name, site) = vendor_from_element(&doc, &re, Some("acumatica.com")).unwrap();
        assert_eq!(name, "Avalara");
        assert_eq!(site.as_deref(), Some("https://www.avalara.com"));

        let own = Html::parse_document(r#"<div class="developer"><a href="https://marketplace.acumatica.com/p/1">Acme</a></div>"#);
        let (name, site) = vendor_from_element(&own, &re, Some("acumatica.com")).unwrap();
        assert_eq!(name, "Acme");
        assert_eq!(site, None);

        let plain = Html::parse_document(r#"<div class="developer-name"> Plain Co </div>"#);
        assert_eq!(vendor_from_element(&plain, &re, None).unwrap().0, "Plain Co");
    }

    #[test]
    fn labels_after_caption() {
        let doc = Html::parse_document(
            "<div>Industries: <span>Retail</span><span>Distribution</span></div><span>Footer</span>",
        );
        let re = Regex::new(r"(?i)industries?").unwrap();
        assert_eq!(labels_near_text(&doc, &re, 5), vec!["Retail", "Distribution"]);

        let doc = Html::parse_document("<ul>Modules<li>Retail</li><li>Distribution</li></ul>");
        let re = Regex::new(r"(?i)modules?").unwrap();
        assert_eq!(labels_near_text(&doc, &re, 5), vec!["Retail", "Distribution"]);
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
