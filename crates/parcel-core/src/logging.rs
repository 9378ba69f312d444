//! Logging init: a log file under the XDG state dir, or stderr as a fallback.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "parcel";

/// Writer that is either the log file or stderr (used when the file handle
/// cannot be cloned).
enum FileOrStderr {
    File(fs::File),
    Stderr,
}

impl Write for FileOrStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileOrStderr::File(f) => f.write(buf),
            FileOrStderr::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileOrStderr::File(f) => f.flush(),
            FileOrStderr::Stderr => io::stderr().lock().flush(),
        }
    }
}

struct LogFile(fs::File);

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = FileOrStderr;

    fn make_writer(&'a self) -> Self::Writer {
        self.0
            .try_clone()
            .map(FileOrStderr::File)
            .unwrap_or(FileOrStderr::Stderr)
    }
}

/// `RUST_LOG` if set, else `info,parcel=debug` (`debug` everywhere when
/// `verbose`).
fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info,parcel=debug")
        }
    })
}

/// `$XDG_STATE_HOME/parcel/parcel.log`.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_NAME)?;
    Ok(xdg_dirs
        .get_state_home()
        .join(APP_NAME)
        .join(format!("{}.log", APP_NAME)))
}

/// Install a subscriber appending to the log file. Returns `Err` when the
/// file cannot be opened so the caller can fall back to stderr.
pub fn init_logging(verbose: bool) -> Result<()> {
    let path = log_file_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(BoxMakeWriter::new(LogFile(file)))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install log subscriber: {}", e))?;

    tracing::info!("parcel logging to {}", path.display());
    Ok(())
}

/// Install a subscriber writing to stderr. A no-op when one is already set.
pub fn init_logging_stderr(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}
