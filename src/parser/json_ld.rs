use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;

use super::domain::extract_domain;
use crate::record::AppRecord;

static LD_JSON_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script[type='application/ld+json']").unwrap());

/// Every JSON-LD object embedded in the page. Top-level arrays are flattened;
/// unparseable blocks are skipped.
pub fn extract_blocks(document: &Html) -> Vec<Value> {
    let mut blocks = Vec::new();

    for element in document.select(&LD_JSON_SEL) {
        let text = element.text().collect::<String>();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Array(items)) => blocks.extend(items),
            Ok(obj) => blocks.push(obj),
            Err(_) => continue,
        }
    }
    blocks
}

/// First node whose `@type` is one of `types`, searching top-level objects
/// and their `@graph` arrays.
pub fn find_typed(blocks: &[Value], types: &[&str]) -> Option<Value> {
    for block in blocks {
        if has_type(block, types) {
            return Some(block.clone());
        }
        if let Some(graph) = block.get("@graph").and_then(Value::as_array) {
            if let Some(node) = graph.iter().find(|n| has_type(n, types)) {
                return Some(node.clone());
            }
        }
    }
    None
}

fn has_type(node: &Value, types: &[&str]) -> bool {
    match node.get("@type") {
        Some(Value::String(t)) => types.contains(&t.as_str()),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| types.contains(&t)),
        _ => false,
    }
}

/// Non-empty trimmed string at `key`.
pub fn str_field(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Number at `key`, accepting numeric strings such as `"4.8"`.
pub fn f64_field(node: &Value, key: &str) -> Option<f64> {
    match node.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-negative count at `key`, accepting `"1,204"` and `12.0`.
pub fn u64_field(node: &Value, key: &str) -> Option<u64> {
    match node.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

/// Copy name, description, aggregate rating and vendor from a
/// SoftwareApplication / Product node. `vendor_keys` are tried in order
/// (`author` for apps, `brand` then `manufacturer` for products).
pub fn apply_app_node(record: &mut AppRecord, node: &Value, vendor_keys: &[&str]) {
    record.app_name = str_field(node, "name");
    record.description = str_field(node, "description");

    if let Some(agg) = node.get("aggregateRating").filter(|a| a.is_object()) {
        record.rating = f64_field(agg, "ratingValue");
        if let Some(count) = u64_field(agg, "reviewCount").or_else(|| u64_field(agg, "ratingCount")) {
            record.review_count = count;
        }
    }

    let vendor = vendor_keys
        .iter()
        .find_map(|k| node.get(*k).filter(|v| v.is_object()));
    if let Some(vendor) = vendor {
        record.vendor_name = str_field(vendor, "name");
        record.vendor_website = str_field(vendor, "url");
        record.vendor_domain = extract_domain(record.vendor_website.as_deref());
    }

    match node.get("applicationCategory") {
        Some(Value::String(c)) => record.push_category(c.trim()),
        Some(Value::Array(cs)) => {
            for c in cs.iter().filter_map(Value::as_str) {
                record.push_category(c.trim());
            }
        }
        _ => {}
    }
}
