//! `annotations.txt` for an item, taken from a gzipped tar of its annotations.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::transport::{self, Transport};
use crate::url_model::annotations_url;

pub const ANNOTATIONS_FILE: &str = "annotations.txt";

/// Fetch the archive for `ids` next to `url` and write its `annotations.txt`
/// into `directory`. Returns the written path, or `None` when the archive has
/// no such member.
pub(crate) fn download_annotations(
    transport: &dyn Transport,
    url: &str,
    token: Option<&str>,
    ids: &[String],
    directory: &Path,
) -> Result<Option<PathBuf>> {
    let archive_url = annotations_url(url, ids)
        .with_context(|| format!("cannot build an annotations locator from {}", url))?;
    let mut archive = Vec::new();
    transport.fetch(
        &archive_url,
        &transport::auth_headers(token),
        None,
        &mut |data| {
            archive.extend_from_slice(data);
            Ok(())
        },
    )?;

    let Some(text) = extract_member(&archive, ANNOTATIONS_FILE)? else {
        tracing::info!(url = %archive_url, "archive holds no {}", ANNOTATIONS_FILE);
        return Ok(None);
    };
    let path = directory.join(ANNOTATIONS_FILE);
    std::fs::create_dir_all(directory)
        .with_context(|| format!("create {}", directory.display()))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".parcel_")
        .tempfile_in(directory)
        .context("create annotations temp file")?;
    tmp.write_all(&text).context("write annotations")?;
    tmp.persist(&path)
        .with_context(|| format!("persist {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote annotations");
    Ok(Some(path))
}

/// Contents of the top-level member `name` of a `.tar.gz` archive.
pub fn extract_member(archive: &[u8], name: &str) -> Result<Option<Vec<u8>>> {
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    for entry in tar.entries().context("read annotations archive")? {
        let mut entry = entry.context("read annotations archive entry")?;
        let path = entry.path().context("archive entry path")?.into_owned();
        if path.as_path() != Path::new(name) {
            continue;
        }
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .with_context(|| format!("read {} from archive", name))?;
        return Ok(Some(contents));
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) fn tar_gz(members: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
