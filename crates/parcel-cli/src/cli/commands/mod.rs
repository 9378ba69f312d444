//! CLI command handlers, one file per command.

mod checksum;
mod download;
mod upload;

use anyhow::{Context, Result};
use parcel_core::CancelToken;
use std::io::{self, Write};
use std::path::Path;

pub use checksum::run_checksum;
pub use download::run_download;
pub use upload::run_upload;

#[cfg(test)]
pub use download::resolve_plan;
#[cfg(test)]
pub use upload::{resolve_upload_plan, UploadAction};

/// Token from `-T` or, failing that, the `-t` file; blank tokens count as none.
pub(crate) fn read_token(inline: Option<&str>, file: Option<&Path>) -> Result<Option<String>> {
    let token = match (inline, file) {
        (Some(token), _) => Some(token.trim().to_string()),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("read token file {}", path.display()))?
                .trim()
                .to_string(),
        ),
        (None, None) => None,
    };
    Ok(token.filter(|t| !t.is_empty()))
}

/// Token tripped by the first Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupted; saving progress");
                tracing::warn!("interrupted by user");
                cancel.cancel();
            }
        }
    });
    cancel
}

/// Ask on stdin. An empty answer means `default_yes`.
pub(crate) async fn confirm(prompt: String, default_yes: bool) -> Result<bool> {
    tokio::task::spawn_blocking(move || -> Result<bool> {
        print!("{}", prompt);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => default_yes,
        })
    })
    .await
    .context("prompt task join")?
}
