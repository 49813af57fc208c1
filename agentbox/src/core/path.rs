//! Relative path normalization.
//!
//! Every path that crosses the pipeline (request files, workspace entries,
//! commit targets) is reduced to one canonical forward-slash form so it can be
//! used as a map key and safely joined under a root.

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Normalize a caller-supplied relative path.
///
/// Backslashes become `/`, empty and `.` segments are dropped. Absolute paths,
/// drive prefixes, and any `..` segment are rejected rather than resolved.
pub fn normalize_relative(raw: &str) -> Result<String, PathError> {
    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(PathError::Absolute {
            path: raw.to_string(),
        });
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(PathError::Traversal {
                    path: raw.to_string(),
                });
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments.join("/"))
}

/// Join a normalized relative path under `root`.
pub fn join_under(root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    let normalized = normalize_relative(relative)?;
    let mut joined = root.to_path_buf();
    for segment in normalized.split('/') {
        joined.push(segment);
    }
    Ok(joined)
}

/// Express `path` relative to `root` in normalized form.
pub fn relative_to(root: &Path, path: &Path) -> Result<String, PathError> {
    let display = path.display().to_string();
    let rel = path
        .strip_prefix(root)
        .map_err(|_| PathError::Traversal {
            path: display.clone(),
        })?;

    let mut segments = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| PathError::NonUtf8 {
                    path: display.clone(),
                })?;
                segments.push(part);
            }
            Component::CurDir => continue,
            _ => {
                return Err(PathError::Traversal { path: display });
            }
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators_and_dot_segments() {
        assert_eq!(normalize_relative("src\\lib.rs").unwrap(), "src/lib.rs");
        assert_eq!(normalize_relative("./a//b/./c.txt").unwrap(), "a/b/c.txt");
    }

    #[test]
    fn rejects_escapes() {
        assert!(matches!(
            normalize_relative("../etc/passwd"),
            Err(PathError::Traversal { .. })
        ));
        assert!(matches!(
            normalize_relative("a/../../b"),
            Err(PathError::Traversal { .. })
        ));
        assert!(matches!(
            normalize_relative("/etc/passwd"),
            Err(PathError::Absolute { .. })
        ));
        assert!(matches!(
            normalize_relative("C:\\Windows"),
            Err(PathError::Absolute { .. })
        ));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(normalize_relative(""), Err(PathError::Empty));
        assert_eq!(normalize_relative("./"), Err(PathError::Empty));
    }

    #[test]
    fn dotted_file_names_are_not_traversal() {
        assert_eq!(normalize_relative("a/..b/c..").unwrap(), "a/..b/c..");
    }

    #[test]
    fn relative_to_round_trips_join_under() {
        let root = Path::new("/tmp/ws");
        let joined = join_under(root, "dir/file.txt").unwrap();
        assert_eq!(joined, Path::new("/tmp/ws/dir/file.txt"));
        assert_eq!(relative_to(root, &joined).unwrap(), "dir/file.txt");
    }

    #[test]
    fn relative_to_rejects_paths_outside_root() {
        let err = relative_to(Path::new("/tmp/ws"), Path::new("/tmp/other/x")).unwrap_err();
        assert!(matches!(err, PathError::Traversal { .. }));
    }
}
