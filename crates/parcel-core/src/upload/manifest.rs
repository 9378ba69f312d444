//! Upload manifests (`[[files]]` TOML) and their resume files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::checksum::normalize_md5_hex;

/// One file to upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntry {
    /// Id of the file node in the submission system.
    pub id: String,
    /// `<program>-<project>`.
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_file_path: Option<PathBuf>,
    /// Directory holding `file_name`; wins over `local_file_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
    /// Multipart upload to continue instead of starting a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
}

impl UploadEntry {
    /// Local file to send: `path/file_name`, then `local_file_path`, then
    /// `file_name`; the first that exists.
    pub fn source_path(&self) -> Result<PathBuf> {
        let mut candidates = Vec::new();
        if let (Some(dir), Some(name)) = (&self.path, &self.file_name) {
            candidates.push(dir.join(name));
        }
        if let Some(local) = &self.local_file_path {
            candidates.push(local.clone());
        }
        if let Some(name) = &self.file_name {
            candidates.push(PathBuf::from(name));
        }
        if candidates.is_empty() {
            bail!(
                "file {} has neither file_name nor local_file_path",
                self.id
            );
        }
        match candidates.iter().find(|p| p.is_file()) {
            Some(found) => Ok(found.clone()),
            None => bail!(
                "no local file for {} (looked at {})",
                self.id,
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("manifest entry without id");
        }
        if self.project_id.trim().is_empty() {
            bail!("file {} has no project_id", self.id);
        }
        if let Some(md5) = &self.md5sum {
            if normalize_md5_hex(md5).is_none() {
                bail!("file {} has a malformed md5sum '{}'", self.id, md5);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UploadManifest {
    #[serde(default)]
    files: Vec<UploadEntry>,
}

pub fn parse_upload_manifest(text: &str) -> Result<Vec<UploadEntry>> {
    let manifest: UploadManifest = toml::from_str(text).context("parse upload manifest")?;
    for entry in &manifest.files {
        entry.validate()?;
    }
    Ok(manifest.files)
}

pub fn load_upload_manifest(path: &Path) -> Result<Vec<UploadEntry>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read upload manifest {}", path.display()))?;
    parse_upload_manifest(&text).with_context(|| format!("in {}", path.display()))
}

/// Write `entries` to `path` atomically.
pub fn save_upload_manifest(path: &Path, entries: &[UploadEntry]) -> Result<()> {
    let doc = UploadManifest {
        files: entries.to_vec(),
    };
    let text = toml::to_string_pretty(&doc).context("serialize upload manifest")?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".parcel_")
        .tempfile_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(text.as_bytes())
        .context("write upload manifest")?;
    tmp.persist(path)
        .with_context(|| format!("persist {}", path.display()))?;
    Ok(())
}

/// `resume_<name>` next to the manifest.
pub fn resume_path(manifest: &Path) -> PathBuf {
    let name = manifest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.toml".to_string());
    manifest.with_file_name(format!("resume_{}", name))
}
