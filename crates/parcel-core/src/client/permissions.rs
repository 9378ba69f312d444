use std::path::Path;

use crate::retry::TransferError;

/// Fails with `PermissionDenied` unless a file can be created (and removed)
/// inside `directory`. Creates the directory when it is missing.
pub fn raise_for_write_permissions(directory: &Path) -> Result<(), TransferError> {
    let denied = |source| TransferError::PermissionDenied {
        directory: directory.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(directory).map_err(denied)?;
    let scratch = tempfile::NamedTempFile::new_in(directory).map_err(denied)?;
    scratch.close().map_err(denied)
}
