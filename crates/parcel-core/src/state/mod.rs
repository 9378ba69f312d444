//! Persistent state store: snapshots of the completed interval set.
//!
//! A snapshot is JSON written to a `.parcel_*` temp file in the state
//! directory, fsynced, then renamed over `<name>.parcel`. Readers therefore
//! only ever see a complete snapshot or the previous one.

mod replace;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::segmenter::{Interval, IntervalSet};

/// Suffix appended to the output file name to form the state file name.
pub const STATE_SUFFIX: &str = ".parcel";

/// Prefix of in-flight temp files in the state directory.
pub const TEMP_PREFIX: &str = ".parcel_";

const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateSnapshot {
    version: u32,
    completed: Vec<Interval>,
}

/// Atomically writes `completed` to `state_path`.
///
/// On error the previous state file (if any) is untouched, the temp file is
/// removed, and the error is logged before being returned.
pub fn save(completed: &IntervalSet, state_path: &Path) -> Result<()> {
    let result = write_snapshot(completed, state_path);
    if let Err(e) = &result {
        tracing::error!(path = %state_path.display(), "unable to save state: {:#}", e);
    }
    result
}

fn write_snapshot(completed: &IntervalSet, state_path: &Path) -> Result<()> {
    let dir = match state_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let snapshot = StateSnapshot {
        version: STATE_VERSION,
        completed: completed.to_vec(),
    };
    let bytes = serde_json::to_vec(&snapshot).context("serialize state")?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .with_context(|| format!("create temp state file in {}", dir.display()))?;
    tmp.write_all(&bytes).context("write temp state file")?;
    tmp.flush().context("flush temp state file")?;
    tmp.as_file().sync_all().context("fsync temp state file")?;

    replace::persist(tmp.into_temp_path(), state_path)
}

/// Loads a snapshot. `Ok(None)` means no state file exists; `Err` means the
/// file exists but cannot be trusted (unreadable, malformed, wrong version,
/// or invalid intervals).
pub fn load(state_path: &Path) -> Result<Option<IntervalSet>> {
    let bytes = match std::fs::read(state_path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("read state: {}", state_path.display()))
        }
    };
    let snapshot: StateSnapshot = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse state: {}", state_path.display()))?;
    if snapshot.version != STATE_VERSION {
        bail!(
            "state file {} has unsupported version {}",
            state_path.display(),
            snapshot.version
        );
    }
    let set = IntervalSet::try_from_intervals(snapshot.completed).ok_or_else(|| {
        anyhow!(
            "state file {} holds invalid or overlapping intervals",
            state_path.display()
        )
    })?;
    Ok(Some(set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample() -> IntervalSet {
        let mut set = IntervalSet::new();
        set.add(Interval::with_md5(0, 512, Some("0f343b0931126a20f133d67c2b018a3b".into())));
        set.add(Interval::with_md5(512, 700, None));
        set.add(Interval::with_md5(900, 1024, Some("c4ca4238a0b923820dcc509a6f75849b".into())));
        set
    }

    fn temp_leftovers(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .count()
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin.parcel");
        let set = sample();
        save(&set, &path).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded, set);
        assert_eq!(temp_leftovers(dir.path()), 0);
    }

    #[test]
    fn save_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin.parcel");
        let set = sample();
        save(&set, &path).unwrap();
        save(&set, &path).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded, set);
        assert_eq!(loaded.len(), 3);
        assert_eq!(temp_leftovers(dir.path()), 0);
    }

    #[test]
    fn later_save_replaces_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin.parcel");
        save(&IntervalSet::full(10), &path).unwrap();
        save(&sample(), &path).unwrap();
        assert_eq!(load(&path).unwrap().unwrap(), sample());
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope.parcel")).unwrap().is_none());
    }

    #[test]
    fn load_garbage_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.parcel");
        fs::write(&path, b"\x80\x04not json at all").unwrap();
        assert!(load(&path).is_err());

        fs::write(&path, br#"{"version": 1, "completed": "nope"}"#).unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn load_rejects_overlap_and_wrong_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.parcel");
        fs::write(
            &path,
            br#"{"version":1,"completed":[{"begin":0,"end":10},{"begin":5,"end":20}]}"#,
        )
        .unwrap();
        assert!(load(&path).is_err());

        fs::write(&path, br#"{"version":99,"completed":[]}"#).unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn failed_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in the way makes the final rename fail.
        let path = dir.path().join("blocked.parcel");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        assert!(save(&sample(), &path).is_err());
        assert_eq!(temp_leftovers(dir.path()), 0);
        assert!(path.join("keep").exists());
    }

    #[test]
    fn save_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.parcel");
        assert!(save(&sample(), &path).is_err());
        assert!(!path.exists());
    }
}
