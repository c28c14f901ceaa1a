use std::path::{Component, Path};

use crate::TransferError;

/// Validates a remote file name before joining it onto a local directory.
///
/// Returns the name unchanged if it is a single normal path component.
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Any separator, so `sub/file` cannot create directories
/// - `.` and `..`
pub fn validate_file_name(name: &str) -> Result<&str, TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidPath(format!(
            "path separators not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        (Some(Component::ParentDir), _) | (Some(Component::CurDir), _) => Err(
            TransferError::InvalidPath(format!("relative directory not allowed: {name}")),
        ),
        _ => Err(TransferError::InvalidPath(format!(
            "not a plain file name: {name}"
        ))),
    }
}
