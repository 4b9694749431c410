//! The pending list: an ordered queue of identifiers still to be processed.
//!
//! Stored as `{ "pending": [ ... ] }`. Order is processing order and is
//! preserved exactly through load/save, duplicates included.

use crate::error::{ReelError, Result};
use crate::io;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingList {
    #[serde(default)]
    pub pending: Vec<String>,
}

impl PendingList {
    pub fn new(pending: Vec<String>) -> Self {
        Self { pending }
    }

    /// Load the pending list. A missing or blank file is an empty list.
    ///
    /// A file that exists but does not parse is an error: silently dropping
    /// the queue would lose work.
    pub fn load(path: &Path) -> Result<Self> {
        let Some(data) = io::read_optional(path)? else {
            return Ok(Self::default());
        };
        serde_json::from_str(&data).map_err(|e| ReelError::MalformedPending {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Overwrite the pending list on disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_json(path, self)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Append identifiers not already queued, keeping first-seen order.
    /// Returns how many were added.
    pub fn extend_unique<I, S>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for item in items {
            let item = item.into();
            if !self.pending.contains(&item) {
                self.pending.push(item);
                added += 1;
            }
        }
        added
    }
}

pub fn load_pending(path: &Path) -> Result<Vec<String>> {
    Ok(PendingList::load(path)?.pending)
}

pub fn save_pending(path: &Path, pending: &[String]) -> Result<()> {
    PendingList::new(pending.to_vec()).save(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let pending = load_pending(&dir.path().join("CreateLater.json")).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn roundtrip_preserves_order_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        let items: Vec<String> = ["banana", "apple", "banana", "no matter"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        save_pending(&path, &items).unwrap();
        assert_eq!(load_pending(&path).unwrap(), items);
    }

    #[test]
    fn saved_shape_is_single_pending_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        save_pending(&path, &["apple".to_string()]).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({"pending": ["apple"]}));
    }

    #[test]
    fn document_without_field_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(load_pending(&path).unwrap().is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        std::fs::write(&path, "{\"pending\": [").unwrap();
        assert!(matches!(
            load_pending(&path),
            Err(ReelError::MalformedPending { .. })
        ));
    }

    #[test]
    fn extend_unique_skips_queued_items() {
        let mut list = PendingList::new(vec!["a".into()]);
        let added = list.extend_unique(["b", "a", "c", "b"]);
        assert_eq!(added, 2);
        assert_eq!(list.pending, vec!["a", "b", "c"]);
    }
}
