use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

use crate::record::{AppRecord, Marketplace};

/// Write `records` to `<output_dir>/<tag>_<YYYYmmdd_HHMMSS>.json` as a
/// pretty-printed array and return the path.
pub fn save_results(records: &[AppRecord], marketplace: Marketplace, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output dir {}", output_dir.display()))?;

    let path = output_dir.join(file_name(marketplace));
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;

    info!("Saved {} records to {}", records.len(), path.display());
    Ok(path)
}

fn file_name(marketplace: Marketplace) -> String {
    format!("{}_{}.json", marketplace.tag(), Local::now().format("%Y%m%d_%H%M%S"))
}

/// Read a file written by `save_results`.
pub fn load_records(path: &Path) -> Result<Vec<AppRecord>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let records: Vec<AppRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a JSON array of app records", path.display()))?;
    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<AppRecord> {
        let mut a = AppRecord::new(Marketplace::ShopifyAppStore, "https://apps.shopify.com/klaviyo");
        a.app_name = Some("Klaviyo: Email Marketing & SMS".into());
        a.vendor_location = Some("Zürich".into());
        a.categories = vec!["Marketing".into()];
        a.rating = Some(4.6);
        a.review_count = 2_891;
        let mut b = AppRecord::new(Marketplace::ShopifyAppStore, "https://apps.shopify.com/judgeme");
        b.app_name = Some("Judge.me".into());
        vec![a, b]
    }

    #[test]
    fn saves_into_created_dir_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/data");
        let records = sample();

        let path = save_results(&records, Marketplace::ShopifyAppStore, &out).unwrap();
        assert!(path.starts_with(&out));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("shopify_app_store_"), "{}", name);
        assert!(name.ends_with(".json"));
        // shopify_app_store_ + YYYYmmdd_HHMMSS + .json
        assert_eq!(name.len(), "shopify_app_store_".len() + 15 + 5);

        assert_eq!(load_records(&path).unwrap(), records);
    }

    #[test]
    fn output_is_pretty_and_keeps_non_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_results(&sample(), Marketplace::ShopifyAppStore, dir.path()).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.starts_with("[\n  {\n    \"app_name\""));
        assert!(text.contains("Zürich"));
    }

    #[test]
    fn empty_run_still_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_results(&[], Marketplace::HubspotMarketplace, dir.path()).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "[]");
    }

    #[test]
    fn load_rejects_non_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"not": "an array"}"#).unwrap();
        assert!(load_records(&path).is_err());
        assert!(load_records(&dir.path().join("missing.json")).is_err());
    }
}
