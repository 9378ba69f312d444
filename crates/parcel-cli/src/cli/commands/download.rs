//! `parcel download` – fetch items, print progress, retry failed items
//! and items whose side files failed.

use anyhow::{bail, Context, Result};
use parcel_core::config::ParcelConfig;
use parcel_core::index::IndexClient;
use parcel_core::manifest;
use parcel_core::scheduler::ProgressStats;
use parcel_core::stream::StreamOptions;
use parcel_core::transport::{CurlOptions, CurlTransport};
use parcel_core::{Client, ClientOptions, DownloadReport};
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::{cancel_on_ctrl_c, confirm, read_token};
use crate::cli::DownloadArgs;

/// Flags merged over config.toml.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub server: String,
    pub ids: Vec<String>,
    pub locators: Vec<String>,
    pub options: ClientOptions,
    pub verify_tls: bool,
    pub retry_amount: u32,
    pub wait_time: Duration,
    pub auto_retry: bool,
}

pub fn resolve_plan(args: &DownloadArgs, cfg: &ParcelConfig) -> Result<DownloadPlan> {
    let mut ids = args.ids.clone();
    if let Some(path) = &args.manifest {
        ids.extend(manifest::read_manifest(path)?);
    }
    let mut seen = HashSet::new();
    ids.retain(|id| !id.trim().is_empty() && seen.insert(id.clone()));
    if ids.is_empty() {
        bail!("nothing to download: pass item ids or -m MANIFEST");
    }

    let server = args
        .server
        .clone()
        .unwrap_or_else(|| cfg.server.clone())
        .trim_end_matches('/')
        .to_string();
    let locators = ids
        .iter()
        .map(|id| format!("{}/data/{}", server, id))
        .collect();

    let directory = match args.dir.clone().or_else(|| cfg.download.dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("current directory")?,
    };

    let token = read_token(args.token.as_deref(), args.token_file.as_deref())?;

    let wait_secs = args.wait_time.unwrap_or(cfg.download.wait_time_secs);
    let wait_time = Duration::try_from_secs_f64(wait_secs.max(0.0))
        .with_context(|| format!("invalid wait time {}", wait_secs))?;

    let options = ClientOptions {
        directory,
        n_workers: args.n_processes.unwrap_or(cfg.n_processes).max(1),
        token,
        stream: StreamOptions {
            http_chunk_size: args
                .http_chunk_size
                .unwrap_or(cfg.download.http_chunk_size)
                .max(1),
            check_segment_md5sums: cfg.download.segment_md5sums && !args.no_segment_md5sums,
            check_file_md5sum: cfg.download.file_md5sum && !args.no_file_md5sum,
        },
        save_interval: args
            .save_interval
            .unwrap_or(cfg.download.save_interval)
            .max(1),
        retry_policy: cfg.retry_policy(),
        related_files: cfg.download.related_files && !args.no_related_files,
        annotations: cfg.download.annotations && !args.no_annotations,
        debug: args.debug,
        ..ClientOptions::default()
    };

    Ok(DownloadPlan {
        server,
        ids,
        locators,
        options,
        verify_tls: cfg.download.verify && !args.no_verify,
        retry_amount: args.retry_amount.unwrap_or(cfg.download.retry_amount),
        wait_time,
        auto_retry: cfg.download.auto_retry && !args.no_auto_retry,
    })
}

pub async fn run_download(args: DownloadArgs, cfg: &ParcelConfig) -> Result<()> {
    let plan = resolve_plan(&args, cfg)?;
    let curl = CurlOptions {
        verify_tls: plan.verify_tls,
        ..CurlOptions::default()
    };
    tracing::info!(
        items = plan.ids.len(),
        server = %plan.server,
        dir = %plan.options.directory.display(),
        "starting download"
    );

    let cancel = cancel_on_ctrl_c();

    let index = tokio::task::spawn_blocking({
        let server = plan.server.clone();
        let token = plan.options.token.clone();
        let ids = plan.ids.clone();
        let curl = curl.clone();
        move || {
            let mut index = IndexClient::new(&server, token, curl);
            index.load(&ids);
            index
        }
    })
    .await
    .context("index task join")?;

    let (progress_tx, progress_rx) = mpsc::channel::<ProgressStats>(16);
    let progress_handle = tokio::spawn(print_progress(progress_rx));

    let client = Arc::new(
        Client::new(Arc::new(CurlTransport::new(curl)), plan.options.clone())
            .with_index(Arc::new(index))
            .with_cancel(cancel.clone())
            .with_progress(progress_tx),
    );

    let mut report = download(&client, plan.locators.clone()).await?;
    for locator in report.retry_candidates() {
        for attempt in 1..=plan.retry_amount {
            if cancel.is_cancelled() {
                break;
            }
            if !plan.auto_retry && !confirm(format!("retry {}? [y/N] ", locator), false).await? {
                break;
            }
            println!(
                "retrying {} in {:.1}s (attempt {}/{})",
                locator,
                plan.wait_time.as_secs_f64(),
                attempt,
                plan.retry_amount
            );
            tokio::time::sleep(plan.wait_time).await;
            let retry = download(&client, vec![locator.clone()]).await?;
            if report.merge_retry(&locator, retry) {
                break;
            }
        }
    }

    drop(client);
    let _ = progress_handle.await;

    println!("downloaded {} item(s)", report.downloaded.len());
    for (locator, err) in &report.errors {
        println!("  failed {}: {}", locator, err);
    }
    for failure in &report.side_file_errors {
        println!(
            "  warning: {} for {} not downloaded: {}",
            failure.target, failure.parent, failure.error
        );
    }
    if cancel.is_cancelled() {
        bail!("download interrupted; rerun the same command to resume");
    }
    if !report.is_success() {
        bail!(
            "{} of {} item(s) failed",
            report.errors.len(),
            plan.locators.len()
        );
    }
    Ok(())
}

async fn download(client: &Arc<Client>, locators: Vec<String>) -> Result<DownloadReport> {
    let client = Arc::clone(client);
    tokio::task::spawn_blocking(move || client.download_files(&locators))
        .await
        .context("download task join")?
}

pub(super) async fn print_progress(mut rx: mpsc::Receiver<ProgressStats>) {
    const PROGRESS_INTERVAL_MS: u128 = 500;
    let mut last_print = Instant::now();
    while let Some(stats) = rx.recv().await {
        let now = Instant::now();
        let finished = stats.bytes_done >= stats.total_bytes;
        if now.duration_since(last_print).as_millis() < PROGRESS_INTERVAL_MS && !finished {
            continue;
        }
        let eta = stats
            .eta_secs()
            .map(|s| format!("{:.0}s", s))
            .unwrap_or_else(|| "?".to_string());
        print!(
            "\r  {}  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}  ",
            stats.name,
            stats.bytes_done as f64 / 1_048_576.0,
            stats.total_bytes as f64 / 1_048_576.0,
            stats.fraction() * 100.0,
            stats.bytes_per_sec() / 1_048_576.0,
            eta
        );
        if finished {
            println!();
        }
        let _ = io::stdout().flush();
        last_print = now;
    }
}
