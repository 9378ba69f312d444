//! `parcel upload` – send files to the submission API, abort or delete them.

use anyhow::{bail, Context, Result};
use parcel_core::config::ParcelConfig;
use parcel_core::scheduler::ProgressStats;
use parcel_core::transport::{CurlOptions, CurlTransport};
use parcel_core::upload::{self, UploadEntry};
use parcel_core::{UploadClient, UploadOptions, UploadReport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::download::print_progress;
use super::{cancel_on_ctrl_c, confirm, read_token};
use crate::cli::UploadArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadAction {
    Upload,
    Abort,
    Delete,
}

/// Flags merged over config.toml.
#[derive(Debug, Clone)]
pub struct UploadPlan {
    pub action: UploadAction,
    pub entries: Vec<UploadEntry>,
    pub options: UploadOptions,
    /// Where unfinished uploads of a manifest are kept.
    pub resume_file: Option<PathBuf>,
    pub verify_tls: bool,
}

pub fn resolve_upload_plan(args: &UploadArgs, cfg: &ParcelConfig) -> Result<UploadPlan> {
    let mut entries = match &args.manifest {
        Some(path) => upload::load_upload_manifest(path)?,
        None => Vec::new(),
    };
    if let Some(id) = &args.identifier {
        let project_id = args
            .project_id
            .clone()
            .with_context(|| format!("-p PROJECT_ID is required to upload {}", id))?;
        entries.push(UploadEntry {
            id: id.clone(),
            project_id,
            file_name: args.file_name.clone(),
            upload_id: args.upload_id.clone(),
            ..UploadEntry::default()
        });
    }
    if entries.is_empty() {
        bail!("nothing to upload: pass -m MANIFEST or -i ID -p PROJECT_ID");
    }
    if let Some(dir) = &args.path {
        for entry in &mut entries {
            entry.path = Some(dir.clone());
        }
    }

    let action = match (args.abort, args.delete) {
        (true, _) => UploadAction::Abort,
        (_, true) => UploadAction::Delete,
        _ => UploadAction::Upload,
    };

    let options = UploadOptions {
        server: args.server.clone().unwrap_or_else(|| cfg.server.clone()),
        token: read_token(args.token.as_deref(), args.token_file.as_deref())?,
        n_workers: args.n_processes.unwrap_or(cfg.n_processes).max(1),
        part_size: upload::part_size(args.part_size.unwrap_or(cfg.upload.part_size)),
        multipart: cfg.upload.multipart && !args.disable_multipart,
        retry_policy: cfg.retry_policy(),
        debug: args.debug,
    };

    Ok(UploadPlan {
        action,
        entries,
        options,
        resume_file: args.manifest.as_deref().map(upload::resume_path),
        verify_tls: cfg.download.verify && !args.no_verify,
    })
}

pub async fn run_upload(args: UploadArgs, cfg: &ParcelConfig) -> Result<()> {
    let mut plan = resolve_upload_plan(&args, cfg)?;
    if plan.action == UploadAction::Upload {
        if let Some(resume) = plan.resume_file.clone().filter(|p| p.is_file()) {
            let prompt = format!(
                "found {}; resume the last upload? [Y/n] ",
                resume.display()
            );
            if args.resume || confirm(prompt, true).await? {
                plan.entries = upload::load_upload_manifest(&resume)?;
                if let Some(dir) = &args.path {
                    for entry in &mut plan.entries {
                        entry.path = Some(dir.clone());
                    }
                }
                tracing::info!(path = %resume.display(), files = plan.entries.len(), "resuming uploads");
            }
        }
    }

    let curl = CurlOptions {
        verify_tls: plan.verify_tls,
        ..CurlOptions::default()
    };
    tracing::info!(
        files = plan.entries.len(),
        server = %plan.options.server,
        action = ?plan.action,
        "starting upload command"
    );

    let cancel = cancel_on_ctrl_c();
    let (progress_tx, progress_rx) = mpsc::channel::<ProgressStats>(16);
    let progress_handle = tokio::spawn(print_progress(progress_rx));
    let client = UploadClient::new(Arc::new(CurlTransport::new(curl)), plan.options.clone())
        .with_cancel(cancel.clone())
        .with_progress(progress_tx);

    let action = plan.action;
    let entries = plan.entries.clone();
    let report: UploadReport = tokio::task::spawn_blocking(move || match action {
        UploadAction::Upload => client.upload(&entries),
        UploadAction::Abort => client.abort(&entries),
        UploadAction::Delete => client.delete(&entries),
    })
    .await
    .context("upload task join")??;
    let _ = progress_handle.await;

    if action == UploadAction::Upload {
        if let Some(resume) = &plan.resume_file {
            report.save_resume(resume)?;
            if !report.incomplete.is_empty() {
                println!("unfinished uploads saved to {}", resume.display());
            }
        } else {
            for entry in &report.incomplete {
                if let Some(upload_id) = &entry.upload_id {
                    println!("resume {} with -u {}", entry.id, upload_id);
                }
            }
        }
    }

    let verb = match action {
        UploadAction::Upload => "uploaded",
        UploadAction::Abort => "aborted",
        UploadAction::Delete => "deleted",
    };
    println!("{} {} file(s)", verb, report.done.len());
    for (id, err) in &report.errors {
        println!("  failed {}: {}", id, err);
    }
    if cancel.is_cancelled() {
        bail!("upload interrupted; rerun the same command to resume");
    }
    if !report.is_success() {
        bail!(
            "{} of {} file(s) failed",
            report.errors.len(),
            plan.entries.len()
        );
    }
    Ok(())
}
