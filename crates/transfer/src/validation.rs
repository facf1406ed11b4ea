//! Path safety checks applied before any receiver-side write.

use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a logical relative path cannot escape its base
/// directory when joined.
///
/// Rejects empty paths, absolute paths, parent traversal (`..`) and
/// Windows prefix components (`C:`, `\\server`).
pub fn validate_relative_path(relative_path: &str) -> Result<(), TransferError> {
    if relative_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    let path = Path::new(relative_path);

    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {relative_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {relative_path}"
                )));
            }
            Component::Prefix(_) => {
                return Err(TransferError::InvalidPath(format!(
                    "path prefix not allowed: {relative_path}"
                )));
            }
            Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {relative_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Validates a file or sender identifier used as a single directory name.
///
/// Stricter than [`validate_relative_path`]: the identifier must be one
/// plain component with no separators at all, since it names a staging
/// directory or per-sender subtree on the receiver.
pub fn validate_file_id(id: &str) -> Result<(), TransferError> {
    if id.is_empty() {
        return Err(TransferError::InvalidPath("empty identifier".into()));
    }
    if id == "." || id == ".." {
        return Err(TransferError::InvalidPath(format!(
            "identifier not allowed: {id}"
        )));
    }
    if id.contains('/') || id.contains('\\') || id.contains('\0') {
        return Err(TransferError::InvalidPath(format!(
            "identifier must be a single path component: {id}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        assert!(validate_relative_path("").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_relative_path("../../../etc/passwd").is_err());
        assert!(validate_relative_path("sub/../../../escape").is_err());
        assert!(validate_relative_path("..").is_err());
    }

    #[test]
    fn rejects_absolute_unix_path() {
        assert!(validate_relative_path("/var/log/syslog").is_err());
    }

    #[test]
    fn accepts_simple_filename() {
        assert!(validate_relative_path("syslog.log").is_ok());
    }

    #[test]
    fn accepts_subdirectory_path() {
        assert!(validate_relative_path("app/2024/01/access.log").is_ok());
    }

    #[test]
    fn accepts_current_dir_prefix() {
        assert!(validate_relative_path("./syslog.log").is_ok());
    }

    #[test]
    fn file_id_rejects_separators() {
        assert!(validate_file_id("a/b").is_err());
        assert!(validate_file_id("a\\b").is_err());
    }

    #[test]
    fn file_id_rejects_dot_names() {
        assert!(validate_file_id(".").is_err());
        assert!(validate_file_id("..").is_err());
        assert!(validate_file_id("").is_err());
    }

    #[test]
    fn file_id_accepts_plain_names() {
        assert!(validate_file_id("rpi-001").is_ok());
        assert!(validate_file_id("20240101120000_app.log").is_ok());
    }
}
