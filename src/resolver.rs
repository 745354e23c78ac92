//! 路径解析：把用户提供的相对路径与文件名限制在上传根目录内。

use std::path::{Component, Path, PathBuf};

use crate::storage::StorageError;

/// A destination inside the upload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub absolute: PathBuf,
    /// Normalized directory part, `/`-separated, empty for the root.
    pub dir: String,
    pub filename: String,
}

impl ResolvedPath {
    /// Storage key of the file relative to the root, e.g. `a/b/x.txt`.
    pub fn key(&self) -> String {
        if self.dir.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.dir, self.filename)
        }
    }
}

/// Joins `root`, `relative_path` and `filename`, refusing anything that
/// would land outside `root`.
pub fn resolve(
    root: &Path,
    relative_path: &str,
    filename: &str,
) -> Result<ResolvedPath, StorageError> {
    let segments = normalize_segments(relative_path)?;
    validate_filename(filename)?;

    let mut absolute = root.to_path_buf();
    for segment in &segments {
        absolute.push(segment);
    }
    absolute.push(filename);

    Ok(ResolvedPath {
        absolute,
        dir: segments.join("/"),
        filename: filename.to_string(),
    })
}

/// Resolves a full lookup key such as `a/b/x.txt` under `root`.
pub fn resolve_key(root: &Path, key: &str) -> Result<PathBuf, StorageError> {
    let mut absolute = root.to_path_buf();
    for segment in normalize_segments(key)? {
        absolute.push(segment);
    }
    Ok(absolute)
}

/// Splits a user path into plain segments. Leading separators are dropped,
/// `\` counts as a separator and `.` segments vanish; `..` is an error.
pub fn normalize_segments(value: &str) -> Result<Vec<String>, StorageError> {
    if value.contains('\0') {
        return Err(StorageError::InvalidPath("path contains a NUL byte"));
    }
    let unified = value.replace('\\', "/");
    let trimmed = unified.trim_start_matches('/');

    let mut segments = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(StorageError::InvalidPath("path escapes the upload root"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath("absolute paths are not allowed"));
            }
        }
    }
    Ok(segments)
}

fn validate_filename(filename: &str) -> Result<(), StorageError> {
    if filename.is_empty() {
        return Err(StorageError::InvalidPath("filename is required"));
    }
    if filename == "." || filename == ".." {
        return Err(StorageError::InvalidPath("filename is not a file name"));
    }
    if filename.contains(['/', '\\', '\0']) {
        return Err(StorageError::InvalidPath(
            "filename must not contain separators",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/uploads")
    }

    #[test]
    fn joins_path_and_filename_under_root() {
        let resolved = resolve(&root(), "a/b", "x.txt").expect("resolve");
        assert_eq!(resolved.absolute, PathBuf::from("/srv/uploads/a/b/x.txt"));
        assert_eq!(resolved.dir, "a/b");
        assert_eq!(resolved.key(), "a/b/x.txt");
    }

    #[test]
    fn empty_path_lands_in_root() {
        let resolved = resolve(&root(), "", "x.txt").expect("resolve");
        assert_eq!(resolved.absolute, PathBuf::from("/srv/uploads/x.txt"));
        assert_eq!(resolved.key(), "x.txt");
    }

    #[test]
    fn leading_slash_and_dot_segments_are_sanitized() {
        let resolved = resolve(&root(), "/a/./b/", "x.txt").expect("resolve");
        assert_eq!(resolved.absolute, PathBuf::from("/srv/uploads/a/b/x.txt"));
        assert_eq!(resolved.dir, "a/b");
    }

    #[test]
    fn parent_segments_are_rejected() {
        for path in ["../../etc", "a/../../b", "..\\..\\etc", "a/.."] {
            let result = resolve(&root(), path, "passwd");
            assert!(
                matches!(result, Err(StorageError::InvalidPath(_))),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn filename_must_be_a_single_segment() {
        for name in ["", ".", "..", "../x", "a/b", "a\\b"] {
            let result = resolve(&root(), "dir", name);
            assert!(
                matches!(result, Err(StorageError::InvalidPath(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn nul_bytes_are_rejected() {
        assert!(resolve(&root(), "a\0b", "x").is_err());
        assert!(resolve(&root(), "a", "x\0.txt").is_err());
    }

    #[test]
    fn resolve_key_rejects_traversal() {
        assert_eq!(
            resolve_key(&root(), "a/b/x.txt").expect("resolve"),
            PathBuf::from("/srv/uploads/a/b/x.txt")
        );
        assert!(resolve_key(&root(), "../secret").is_err());
        assert!(resolve_key(&root(), "a/../../secret").is_err());
    }
}
