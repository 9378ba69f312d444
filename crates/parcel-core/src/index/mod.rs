//! Metadata index: per-item md5, size, access level and related files.
//!
//! The index is optional. An id it knows nothing about is downloaded as a
//! plain transfer with no extra metadata.

mod client;

use serde::Deserialize;
use std::collections::HashMap;

pub use client::IndexClient;

/// Lookups the orchestrator makes against a metadata index.
pub trait MetadataIndex: Send + Sync {
    /// Ids of index and metadata files that belong with `id`.
    fn related_files(&self, id: &str) -> Vec<String>;
    fn annotations(&self, id: &str) -> Vec<String>;
    fn md5sum(&self, id: &str) -> Option<String>;
    fn filesize(&self, id: &str) -> Option<u64>;
    /// Access level (`open` or `controlled`).
    fn access(&self, id: &str) -> Option<String>;
}

/// What the index holds for one id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexEntry {
    pub access: Option<String>,
    pub file_size: Option<u64>,
    pub md5sum: Option<String>,
    pub annotations: Vec<String>,
    pub related_files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HitsResponse {
    data: Option<HitsData>,
}

#[derive(Debug, Deserialize)]
struct HitsData {
    #[serde(default)]
    hits: Option<Vec<Hit>>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    id: Option<String>,
    file_id: Option<String>,
    access: Option<String>,
    file_size: Option<u64>,
    md5sum: Option<String>,
    #[serde(default)]
    annotations: Vec<AnnotationRef>,
    #[serde(default)]
    index_files: Vec<FileRef>,
    #[serde(default)]
    metadata_files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
struct AnnotationRef {
    annotation_id: String,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
}

/// Parses a `/v0/files` style response body into entries keyed by id.
/// Hits without an id are skipped; a body without `data.hits` yields nothing.
pub fn parse_hits(body: &[u8]) -> serde_json::Result<Vec<(String, IndexEntry)>> {
    let response: HitsResponse = serde_json::from_slice(body)?;
    let hits = response.data.and_then(|d| d.hits).unwrap_or_default();
    Ok(hits
        .into_iter()
        .filter_map(|hit| {
            let id = hit.id.or(hit.file_id)?;
            let related_files = hit
                .index_files
                .into_iter()
                .chain(hit.metadata_files)
                .map(|f| f.file_id)
                .collect();
            let entry = IndexEntry {
                access: hit.access,
                file_size: hit.file_size,
                md5sum: hit.md5sum.map(|m| m.to_ascii_lowercase()),
                annotations: hit.annotations.into_iter().map(|a| a.annotation_id).collect(),
                related_files,
            };
            Some((id, entry))
        })
        .collect())
}

/// In-memory index, filled by `IndexClient::load` or directly.
#[derive(Debug, Clone, Default)]
pub struct IndexMap {
    entries: HashMap<String, IndexEntry>,
}

impl IndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry` unless `id` is already known.
    pub fn insert(&mut self, id: String, entry: IndexEntry) {
        self.entries.entry(id).or_insert(entry);
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataIndex for IndexMap {
    fn related_files(&self, id: &str) -> Vec<String> {
        self.get(id).map(|e| e.related_files.clone()).unwrap_or_default()
    }

    fn annotations(&self, id: &str) -> Vec<String> {
        self.get(id).map(|e| e.annotations.clone()).unwrap_or_default()
    }

    fn md5sum(&self, id: &str) -> Option<String> {
        self.get(id).and_then(|e| e.md5sum.clone())
    }

    fn filesize(&self, id: &str) -> Option<u64> {
        self.get(id).and_then(|e| e.file_size)
    }

    fn access(&self, id: &str) -> Option<String> {
        self.get(id).and_then(|e| e.access.clone())
    }
}
