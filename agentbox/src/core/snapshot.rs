//! Pre-mutation baseline of every submitted file.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::core::path::normalize_relative;
use crate::core::types::FileRecord;
use crate::error::ValidationError;

/// Original content keyed by normalized relative path.
///
/// Owned by exactly one invocation; never shared or mutated after capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    /// Capture a snapshot from request files.
    ///
    /// With `trim` set, leading and trailing whitespace is stripped from each
    /// content before capture. The change detector itself never normalizes.
    pub fn capture(files: &[FileRecord], trim: bool) -> Result<Self, ValidationError> {
        if files.is_empty() {
            return Err(ValidationError::NoFiles);
        }

        let mut entries = BTreeMap::new();
        for file in files {
            let path = normalize_relative(&file.path)?;
            let content = if trim {
                file.content.trim()
            } else {
                file.content.as_str()
            };
            if entries
                .insert(path.clone(), content.as_bytes().to_vec())
                .is_some()
            {
                return Err(ValidationError::DuplicatePath { path });
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_slice()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SHA-256 over length-prefixed path/content pairs, hex encoded.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.entries {
            hasher.update((path.len() as u64).to_le_bytes());
            hasher.update(path.as_bytes());
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(content);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PathError;

    #[test]
    fn capture_normalizes_paths() {
        let snapshot = Snapshot::capture(&[FileRecord::new("./src\\main.rs", "fn main() {}")], false)
            .expect("capture");
        assert_eq!(snapshot.get("src/main.rs"), Some("fn main() {}".as_bytes()));
    }

    #[test]
    fn capture_rejects_empty_and_duplicates() {
        assert_eq!(Snapshot::capture(&[], false), Err(ValidationError::NoFiles));

        let err = Snapshot::capture(
            &[FileRecord::new("a.txt", "1"), FileRecord::new("./a.txt", "2")],
            false,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicatePath {
                path: "a.txt".to_string()
            }
        );
    }

    #[test]
    fn capture_rejects_traversal() {
        let err = Snapshot::capture(&[FileRecord::new("../x", "")], false).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidPath(PathError::Traversal { .. })
        ));
    }

    #[test]
    fn trim_is_opt_in() {
        let files = [FileRecord::new("a.txt", "  hello\n")];
        let raw = Snapshot::capture(&files, false).expect("raw");
        let trimmed = Snapshot::capture(&files, true).expect("trimmed");
        assert_eq!(raw.get("a.txt"), Some("  hello\n".as_bytes()));
        assert_eq!(trimmed.get("a.txt"), Some("hello".as_bytes()));
    }

    #[test]
    fn content_hash_depends_on_paths_and_content() {
        let a = Snapshot::capture(&[FileRecord::new("a", "bc")], false).unwrap();
        let b = Snapshot::capture(&[FileRecord::new("ab", "c")], false).unwrap();
        let a_again = Snapshot::capture(&[FileRecord::new("a", "bc")], false).unwrap();
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash(), a_again.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }
}
