//! Download manifests: tab-separated text with an `id` column.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Item ids listed in `text`, in order and without duplicates.
///
/// The first non-empty line is the header and must contain an `id` column.
/// Blank lines and rows too short to have an id are skipped.
pub fn parse_manifest(text: &str) -> Result<Vec<String>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        bail!("manifest is empty");
    };
    let Some(column) = header.split('\t').position(|h| h.trim() == "id") else {
        bail!("manifest header has no 'id' column");
    };

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for line in lines {
        let Some(id) = line.split('\t').nth(column).map(str::trim) else {
            continue;
        };
        if !id.is_empty() && seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

pub fn read_manifest(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read manifest {}", path.display()))?;
    parse_manifest(&text).with_context(|| format!("parse manifest {}", path.display()))
}
