//! Checksum command: compute MD5 of a file.

use anyhow::Result;
use parcel_core::checksum;
use std::path::Path;

/// Compute and print the MD5 of the given file.
pub async fn run_checksum(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking({
        let path = path.clone();
        move || checksum::md5_path(&path)
    })
    .await??;
    println!("{}  {}", digest, path.display());
    Ok(())
}
