//! Recursive discovery of shippable files under the watched root.

use std::path::{Path, PathBuf};

use crate::SenderError;

/// One discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute path on the local filesystem.
    pub path: PathBuf,
    /// Path relative to the watched root, always with forward slashes.
    /// This is the ledger key and the identity sent to the collector.
    pub relative_path: String,
}

impl Candidate {
    /// The file name component of the candidate.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

/// Walks `root` recursively and returns every regular file whose name
/// ends in `suffix`, sorted by relative path for a deterministic order.
pub fn scan(root: &Path, suffix: &str) -> Result<Vec<Candidate>, SenderError> {
    let mut found = Vec::new();
    walk(root, root, suffix, &mut found)?;
    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(found)
}

fn walk(
    root: &Path,
    dir: &Path,
    suffix: &str,
    found: &mut Vec<Candidate>,
) -> Result<(), SenderError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, suffix, found)?;
        } else if file_type.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix))
            && let Ok(rel) = path.strip_prefix(root)
        {
            let relative_path = rel
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect::<Vec<_>>()
                .join("/");
            found.push(Candidate {
                path,
                relative_path,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_matching_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), b"a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"n").unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deep")).unwrap();
        std::fs::write(dir.path().join("sub/b.log"), b"b").unwrap();
        std::fs::write(dir.path().join("sub/deep/c.log"), b"c").unwrap();

        let found = scan(dir.path(), ".log").unwrap();
        let rel: Vec<_> = found.iter().map(|c| c.relative_path.as_str()).collect();
        assert_eq!(rel, vec!["a.log", "sub/b.log", "sub/deep/c.log"]);
    }

    #[test]
    fn empty_root_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(dir.path(), ".log").unwrap().is_empty());
    }

    #[test]
    fn file_name_strips_directories() {
        let c = Candidate {
            path: PathBuf::from("/tmp/x/sub/app.log"),
            relative_path: "sub/app.log".into(),
        };
        assert_eq!(c.file_name(), "app.log");
    }
}
