//! S3-style multipart wire format: part layout, request URLs and XML bodies.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Smallest part the object store accepts (except the last one).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
/// Part sizes are whole multiples of this.
pub const PAGE_SIZE: u64 = 4096;

/// Effective part size: at least `MIN_PART_SIZE`, rounded up to a page.
pub fn part_size(requested: u64) -> u64 {
    requested.max(MIN_PART_SIZE).div_ceil(PAGE_SIZE) * PAGE_SIZE
}

/// One part of a file: 1-based number and byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    pub number: u32,
    pub offset: u64,
    pub len: u64,
}

/// Split `file_size` bytes into parts of `part_size` (last one shorter).
pub fn plan_parts(file_size: u64, part_size: u64) -> Vec<PartSpec> {
    let part_size = part_size.max(1);
    let mut parts = Vec::new();
    let mut offset = 0;
    let mut number = 1;
    while offset < file_size {
        let len = part_size.min(file_size - offset);
        parts.push(PartSpec { number, offset, len });
        offset += len;
        number += 1;
    }
    parts
}

/// `<server>/v0/submission/<PROGRAM>/<PROJECT>/files/<id>` where the
/// project id is `<program>-<project>`.
pub fn submission_url(server: &str, project_id: &str, id: &str) -> Result<String> {
    let (program, project) = project_id
        .split_once('-')
        .filter(|(program, project)| !program.is_empty() && !project.is_empty())
        .with_context(|| format!("unable to parse project id '{}'", project_id))?;
    if id.trim().is_empty() {
        bail!("missing file id for project {}", project_id);
    }
    let server = server.trim_end_matches('/');
    let server = if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else {
        format!("https://{}", server)
    };
    Ok(format!(
        "{}/v0/submission/{}/{}/files/{}",
        server,
        program.to_uppercase(),
        project.to_uppercase(),
        id.trim()
    ))
}

/// `url?uploads`: starts a multipart upload.
pub fn initiate_url(url: &str) -> Result<String> {
    let mut parsed = Url::parse(url).with_context(|| format!("invalid upload url {}", url))?;
    parsed.set_query(Some("uploads"));
    Ok(parsed.into())
}

/// `url?uploadId=<id>`: lists, completes or aborts one multipart upload.
pub fn upload_id_url(url: &str, upload_id: &str) -> Result<String> {
    let mut parsed = Url::parse(url).with_context(|| format!("invalid upload url {}", url))?;
    parsed
        .query_pairs_mut()
        .clear()
        .append_pair("uploadId", upload_id);
    Ok(parsed.into())
}

/// Target of one part PUT, given the `upload_id_url`.
pub fn part_url(upload_url: &str, number: u32) -> String {
    format!("{}&partNumber={}", upload_url, number)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateMultipartUploadResult {
    upload_id: String,
}

/// Upload id from an `InitiateMultipartUploadResult` body.
pub fn parse_upload_id(body: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(body).context("initiate response is not UTF-8")?;
    let result: InitiateMultipartUploadResult =
        quick_xml::de::from_str(text).context("parse initiate response")?;
    let id = result.upload_id.trim();
    if id.is_empty() {
        bail!("initiate response carries an empty UploadId");
    }
    Ok(id.to_string())
}

#[derive(Debug, Deserialize, Serialize)]
struct Part {
    #[serde(rename = "PartNumber")]
    number: u32,
    #[serde(rename = "ETag")]
    etag: String,
}

#[derive(Debug, Deserialize)]
struct ListPartsResult {
    #[serde(rename = "Part", default)]
    parts: Vec<Part>,
}

/// Parts already stored, by number, from a `ListPartsResult` body.
pub fn parse_parts(body: &[u8]) -> Result<BTreeMap<u32, String>> {
    let text = std::str::from_utf8(body).context("list parts response is not UTF-8")?;
    let result: ListPartsResult =
        quick_xml::de::from_str(text).context("parse list parts response")?;
    Ok(result
        .parts
        .into_iter()
        .map(|p| (p.number, p.etag))
        .collect())
}

#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    parts: Vec<Part>,
}

/// `CompleteMultipartUpload` body listing `parts` in number order.
pub fn complete_body(parts: &BTreeMap<u32, String>) -> Result<String> {
    let doc = CompleteMultipartUpload {
        parts: parts
            .iter()
            .map(|(&number, etag)| Part {
                number,
                etag: etag.clone(),
            })
            .collect(),
    };
    quick_xml::se::to_string(&doc).context("build complete request")
}
