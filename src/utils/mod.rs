// Filesystem helpers shared by the lifecycle operations.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Removes a file or directory tree, tolerating a target that is already
/// gone. Partial-creation cleanup and `truncate_database` both rely on this
/// being safe to call twice.
pub fn remove_recursively(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}
