//! On-disk catalog formats.
//!
//! Three shapes are accepted by [`read_items`]:
//! - a bundle directory holding `content_items.ndjson` plus a `manifest.json`
//!   with its sha256 digest and record count;
//! - a single `.ndjson` file, one item per line;
//! - any other file, parsed as a JSON array of items.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use navicue_catalog_core::ContentItem;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, info};

pub const BUNDLE_FORMAT_VERSION: i64 = 1;
pub const ITEMS_FILE: &str = "content_items.ndjson";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleFileDigest {
    pub path: String,
    pub sha256: String,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleManifest {
    pub format_version: i64,
    pub exported_at: String,
    pub files: Vec<BundleFileDigest>,
}

/// Read catalog items from a bundle directory, an NDJSON file, or a JSON array file.
///
/// # Errors
/// Returns an error when the path cannot be read, a row fails to parse, or a
/// bundle manifest does not match its files.
pub fn read_items(path: &Path) -> Result<Vec<ContentItem>> {
    let items = if path.is_dir() {
        read_bundle(path)?
    } else if path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("ndjson"))
    {
        read_ndjson_items(path)?
    } else {
        read_json_array(path)?
    };

    debug!(path = %path.display(), items = items.len(), "read catalog items");
    Ok(items)
}

/// Read and verify a bundle directory written by [`write_bundle`].
///
/// The items file is read once. Its digest is checked before any row is
/// parsed, then the parsed row count is checked against the manifest.
///
/// # Errors
/// Returns an error when the manifest is missing, unsupported, or disagrees
/// with the digest or record count of the items file.
pub fn read_bundle(in_dir: &Path) -> Result<Vec<ContentItem>> {
    let manifest = read_manifest(&in_dir.join(MANIFEST_FILE))?;
    let expected = items_entry(&manifest)?;

    let items_path = in_dir.join(ITEMS_FILE);
    if !items_path.exists() {
        return Err(anyhow!("manifest references missing file {}", items_path.display()));
    }
    let body = fs::read_to_string(&items_path)
        .with_context(|| format!("failed to read bundle file {}", items_path.display()))?;

    let actual_sha256 = sha256_hex(&body);
    if actual_sha256 != expected.sha256 {
        return Err(anyhow!(
            "manifest digest mismatch for {ITEMS_FILE}: expected {}, got {actual_sha256}",
            expected.sha256
        ));
    }

    let items = parse_ndjson_rows(&body, &items_path)?;
    if items.len() != expected.records {
        return Err(anyhow!(
            "manifest record count mismatch for {ITEMS_FILE}: expected {}, got {}",
            expected.records,
            items.len()
        ));
    }
    Ok(items)
}

/// Write `items` as a bundle directory and return the manifest that describes it.
///
/// # Errors
/// Returns an error when the directory or files cannot be created, written, or serialized.
pub fn write_bundle(out_dir: &Path, items: &[ContentItem]) -> Result<BundleManifest> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create bundle directory {}", out_dir.display()))?;

    let body = render_ndjson(items)?;
    let items_path = out_dir.join(ITEMS_FILE);
    fs::write(&items_path, &body)
        .with_context(|| format!("failed to write bundle file {}", items_path.display()))?;

    let records = items.len();
    let manifest = BundleManifest {
        format_version: BUNDLE_FORMAT_VERSION,
        exported_at: now_rfc3339()?,
        files: vec![BundleFileDigest {
            path: ITEMS_FILE.to_string(),
            sha256: sha256_hex(&body),
            records,
        }],
    };

    let manifest_path = out_dir.join(MANIFEST_FILE);
    let manifest_json =
        serde_json::to_vec_pretty(&manifest).context("failed to serialize bundle manifest")?;
    fs::write(&manifest_path, manifest_json).with_context(|| {
        format!("failed to write bundle manifest {}", manifest_path.display())
    })?;

    info!(path = %out_dir.display(), records, "catalog bundle written");
    Ok(manifest)
}

fn read_json_array(path: &Path) -> Result<Vec<ContentItem>> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read catalog file {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse catalog JSON array {}", path.display()))
}

fn read_ndjson_items(path: &Path) -> Result<Vec<ContentItem>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file {}", path.display()))?;
    parse_ndjson_rows(&body, path)
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn sha256_hex(body: &str) -> String {
    format!("{:x}", Sha256::digest(body.as_bytes()))
}

fn render_ndjson(items: &[ContentItem]) -> Result<String> {
    let mut body = String::new();
    for item in items {
        let row = serde_json::to_string(item)
            .with_context(|| format!("failed to serialize catalog item {}", item.id))?;
        body.push_str(&row);
        body.push('\n');
    }
    Ok(body)
}

/// Blank lines are skipped; row numbers in errors are 1-based file lines.
fn parse_ndjson_rows(body: &str, path: &Path) -> Result<Vec<ContentItem>> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line.trim()).with_context(|| {
                format!("failed to parse NDJSON row {} from {}", index + 1, path.display())
            })
        })
        .collect()
}

fn read_manifest(path: &Path) -> Result<BundleManifest> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read manifest file {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse manifest JSON {}", path.display()))
}

/// The manifest entry for the items file, after the version and entry checks.
fn items_entry(manifest: &BundleManifest) -> Result<&BundleFileDigest> {
    if !(1..=BUNDLE_FORMAT_VERSION).contains(&manifest.format_version) {
        return Err(anyhow!(
            "unsupported bundle format version {}; this build reads 1..={BUNDLE_FORMAT_VERSION}",
            manifest.format_version
        ));
    }

    let mut seen = BTreeSet::new();
    if let Some(repeated) = manifest.files.iter().find(|file| !seen.insert(file.path.as_str())) {
        return Err(anyhow!("manifest contains duplicate file entry: {}", repeated.path));
    }

    manifest
        .files
        .iter()
        .find(|file| file.path == ITEMS_FILE)
        .ok_or_else(|| anyhow!("manifest is missing required file entry: {ITEMS_FILE}"))
}
