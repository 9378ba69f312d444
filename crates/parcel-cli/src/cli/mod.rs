//! CLI for the parcel download client.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use parcel_core::config;
use std::path::{Path, PathBuf};

use commands::{run_checksum, run_download, run_upload};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "parcel")]
#[command(about = "parcel: resumable parallel downloads from a content repository", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download items by id and/or from a manifest.
    Download(DownloadArgs),

    /// Upload files to the submission API (or abort/delete uploads).
    Upload(UploadArgs),

    /// Compute the MD5 of a file (e.g. to compare with the index).
    Checksum {
        /// Path to the file.
        path: String,
    },
}

/// Flags for `parcel download`. Unset values come from config.toml.
#[derive(Debug, Clone, Args)]
pub struct DownloadArgs {
    /// Item ids to download.
    #[arg(value_name = "ID")]
    pub ids: Vec<String>,

    /// Tab-separated manifest with an `id` column.
    #[arg(short = 'm', long)]
    pub manifest: Option<PathBuf>,

    /// Base download directory.
    #[arg(short = 'd', long)]
    pub dir: Option<PathBuf>,

    /// Worker threads per file.
    #[arg(short = 'n', long = "n-processes", value_name = "N")]
    pub n_processes: Option<usize>,

    /// API server, e.g. https://api.gdc.cancer.gov
    #[arg(short = 's', long)]
    pub server: Option<String>,

    /// File containing an auth token.
    #[arg(short = 't', long = "token-file", conflicts_with = "token")]
    pub token_file: Option<PathBuf>,

    /// Auth token given inline.
    #[arg(short = 'T', long)]
    pub token: Option<String>,

    /// Bytes buffered per write and per segment hash.
    #[arg(long, value_name = "BYTES")]
    pub http_chunk_size: Option<usize>,

    /// Completed bytes between state saves.
    #[arg(long, value_name = "BYTES")]
    pub save_interval: Option<u64>,

    #[arg(long)]
    pub no_segment_md5sums: bool,

    #[arg(long)]
    pub no_file_md5sum: bool,

    /// Skip index and metadata files attached to each item.
    #[arg(long)]
    pub no_related_files: bool,

    /// Skip the annotations.txt of annotated items.
    #[arg(long)]
    pub no_annotations: bool,

    /// Do not verify TLS certificates.
    #[arg(long)]
    pub no_verify: bool,

    /// Whole-item retries for failed items.
    #[arg(long, value_name = "N")]
    pub retry_amount: Option<u32>,

    /// Seconds to wait before each whole-item retry.
    #[arg(long = "wait-time", value_name = "SECS")]
    pub wait_time: Option<f64>,

    /// Ask before retrying a failed item.
    #[arg(long)]
    pub no_auto_retry: bool,

    /// Stop at the first failure and log at debug level.
    #[arg(long)]
    pub debug: bool,
}

/// Flags for `parcel upload`. Unset values come from config.toml.
#[derive(Debug, Clone, Args)]
pub struct UploadArgs {
    /// TOML manifest with `[[files]]` entries (id, project_id, file_name, ...).
    #[arg(short = 'm', long)]
    pub manifest: Option<PathBuf>,

    /// Id of a single file to upload.
    #[arg(short = 'i', long)]
    pub identifier: Option<String>,

    /// Project of the single file, e.g. TCGA-BRCA.
    #[arg(short = 'p', long = "project-id")]
    pub project_id: Option<String>,

    /// Local name of the single file.
    #[arg(long = "file-name", requires = "identifier")]
    pub file_name: Option<String>,

    /// Directory holding the files; wins over manifest paths.
    #[arg(short = 'f', long)]
    pub path: Option<PathBuf>,

    /// Multipart upload id to continue (single file).
    #[arg(short = 'u', long = "upload-id", requires = "identifier")]
    pub upload_id: Option<String>,

    /// Send every file in one PUT.
    #[arg(long)]
    pub disable_multipart: bool,

    /// Bytes per multipart part (at least 5 MiB).
    #[arg(long, value_name = "BYTES")]
    pub part_size: Option<u64>,

    /// Abort the multipart uploads named by upload ids.
    #[arg(long, conflicts_with = "delete")]
    pub abort: bool,

    /// Delete uploaded files.
    #[arg(long)]
    pub delete: bool,

    /// Continue from the manifest's resume file without asking.
    #[arg(long)]
    pub resume: bool,

    /// Parallel part uploads per file.
    #[arg(short = 'n', long = "n-processes", value_name = "N")]
    pub n_processes: Option<usize>,

    /// API server, e.g. https://api.gdc.cancer.gov
    #[arg(short = 's', long)]
    pub server: Option<String>,

    /// File containing an auth token.
    #[arg(short = 't', long = "token-file", conflicts_with = "token")]
    pub token_file: Option<PathBuf>,

    /// Auth token given inline.
    #[arg(short = 'T', long)]
    pub token: Option<String>,

    /// Do not verify TLS certificates.
    #[arg(long)]
    pub no_verify: bool,

    /// Stop at the first failure and log at debug level.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Whether debug logging was requested.
    pub fn verbose(&self) -> bool {
        match &self.command {
            CliCommand::Download(args) => args.debug,
            CliCommand::Upload(args) => args.debug,
            CliCommand::Checksum { .. } => false,
        }
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            CliCommand::Download(args) => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_download(args, &cfg).await?
            }
            CliCommand::Upload(args) => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_upload(args, &cfg).await?
            }
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
