//! HTTP client for the `/v0/files` metadata endpoint.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use curl::easy::{Easy, List};

use super::{parse_hits, IndexEntry, IndexMap, MetadataIndex};
use crate::transport::CurlOptions;

const FILES_ENDPOINT: &str = "/v0/files";
const LEGACY_FILES_ENDPOINT: &str = "/v0/legacy/files";
const FIELDS: &str = "file_id,file_size,md5sum,annotations.annotation_id,\
                      metadata_files.file_id,index_files.file_id,access";

/// Index backed by the remote API. Call `load` once with every id of a run.
pub struct IndexClient {
    server: String,
    token: Option<String>,
    curl: CurlOptions,
    map: IndexMap,
}

impl IndexClient {
    pub fn new(server: &str, token: Option<String>, curl: CurlOptions) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            token,
            curl,
            map: IndexMap::new(),
        }
    }

    /// Fetch metadata for `ids` in one request. Falls back to the legacy
    /// endpoint when the primary one fails or knows none of them. Failures
    /// are logged and leave the index empty.
    pub fn load(&mut self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let body = query_body(ids);
        for endpoint in [FILES_ENDPOINT, LEGACY_FILES_ENDPOINT] {
            let url = format!("{}{}", self.server, endpoint);
            match self.post(&url, &body) {
                Ok(hits) if !hits.is_empty() => {
                    tracing::debug!(%url, hits = hits.len(), "loaded file metadata");
                    for (id, entry) in hits {
                        self.map.insert(id, entry);
                    }
                    return;
                }
                Ok(_) => tracing::debug!(%url, "no metadata hits"),
                Err(e) => tracing::debug!(%url, "metadata query failed: {:#}", e),
            }
        }
        tracing::info!("file metadata unavailable; downloading without it");
    }

    pub fn entry(&self, id: &str) -> Option<&IndexEntry> {
        self.map.get(id)
    }

    fn post(&self, url: &str, body: &[u8]) -> Result<Vec<(String, IndexEntry)>> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.post(true)?;
        easy.post_fields_copy(body)?;
        easy.connect_timeout(Duration::from_secs(15))?;
        easy.timeout(Duration::from_secs(120))?;
        if !self.curl.verify_tls {
            easy.ssl_verify_peer(false)?;
            easy.ssl_verify_host(false)?;
        }
        let mut list = List::new();
        list.append("Content-Type: application/json")?;
        if let Some(token) = &self.token {
            list.append(&format!("X-Auth-Token: {}", token.trim()))?;
        }
        easy.http_headers(list)?;

        let mut response = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                response.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform().context("metadata request failed")?;
        }
        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            bail!("metadata endpoint returned HTTP {}", code);
        }
        parse_hits(&response).context("parse metadata response")
    }
}

fn query_body(ids: &[String]) -> Vec<u8> {
    let filters = serde_json::json!({
        "op": "and",
        "content": [{
            "op": "in",
            "content": {"field": "files.file_id", "value": ids},
        }],
    });
    serde_json::json!({
        "fields": FIELDS,
        "filters": filters.to_string(),
        "from": "0",
        "size": ids.len().to_string(),
    })
    .to_string()
    .into_bytes()
}

impl MetadataIndex for IndexClient {
    fn related_files(&self, id: &str) -> Vec<String> {
        self.map.related_files(id)
    }

    fn annotations(&self, id: &str) -> Vec<String> {
        self.map.annotations(id)
    }

    fn md5sum(&self, id: &str) -> Option<String> {
        self.map.md5sum(id)
    }

    fn filesize(&self, id: &str) -> Option<u64> {
        self.map.filesize(id)
    }

    fn access(&self, id: &str) -> Option<String> {
        self.map.access(id)
    }
}
