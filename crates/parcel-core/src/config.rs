use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::scheduler::DEFAULT_SAVE_INTERVAL;
use crate::stream::DEFAULT_HTTP_CHUNK_SIZE;
use crate::upload::MIN_PART_SIZE;

/// Per-segment retry parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per segment (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    /// Delays too large for a `Duration` (e.g. `inf`) fall back to the cap.
    pub fn to_policy(&self) -> RetryPolicy {
        let max_delay = Duration::from_secs(self.max_delay_secs);
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::try_from_secs_f64(self.base_delay_secs.max(0.0))
                .unwrap_or(max_delay),
            max_delay,
        }
    }
}

/// `[download]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Base directory for downloads (current directory when unset).
    pub dir: Option<PathBuf>,
    pub http_chunk_size: usize,
    /// Completed bytes between state saves.
    pub save_interval: u64,
    pub segment_md5sums: bool,
    pub file_md5sum: bool,
    pub related_files: bool,
    /// Write `annotations.txt` next to items that carry annotations.
    pub annotations: bool,
    /// Verify TLS certificates.
    pub verify: bool,
    /// Whole-item retries for failed locators.
    pub retry_amount: u32,
    pub wait_time_secs: f64,
    /// Retry failed locators without asking.
    pub auto_retry: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: None,
            http_chunk_size: DEFAULT_HTTP_CHUNK_SIZE,
            save_interval: DEFAULT_SAVE_INTERVAL,
            segment_md5sums: true,
            file_md5sum: true,
            related_files: true,
            annotations: true,
            verify: true,
            retry_amount: 1,
            wait_time_secs: 5.0,
            auto_retry: true,
        }
    }
}

/// `[upload]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Bytes per multipart part; raised to the store's minimum.
    pub part_size: u64,
    pub multipart: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE,
            multipart: true,
        }
    }
}

/// Global configuration loaded from `~/.config/parcel/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelConfig {
    /// API server that serves `/data/<id>` and `/v0/files`.
    pub server: String,
    /// Worker threads per transfer.
    pub n_processes: usize,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    /// Optional per-segment retry policy; built-in defaults when missing.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ParcelConfig {
    fn default() -> Self {
        Self {
            server: "https://api.gdc.cancer.gov".to_string(),
            n_processes: 8,
            download: DownloadConfig::default(),
            upload: UploadConfig::default(),
            retry: None,
        }
    }
}

impl ParcelConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryConfig::to_policy)
            .unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("parcel")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ParcelConfig> {
    load_or_init_at(&config_path()?)
}

/// Like `load_or_init` for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<ParcelConfig> {
    if !path.exists() {
        let default_cfg = ParcelConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: ParcelConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
