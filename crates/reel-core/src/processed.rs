//! Processed state: which slugs have already been produced.
//!
//! Read permissively. A missing, blank or corrupt file is an empty state,
//! never an error. The runner flushes after every item, so a crash loses at
//! most the item that was in flight.

use crate::error::Result;
use crate::io;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessedState {
    entries: BTreeMap<String, bool>,
}

impl ProcessedState {
    pub fn load(path: &Path) -> Result<Self> {
        let Some(data) = io::read_optional(path)? else {
            return Ok(Self::default());
        };
        match serde_json::from_str(&data) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "processed state is not valid JSON; starting from empty state"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_json(path, self)
    }

    pub fn is_processed(&self, slug: &str) -> bool {
        self.entries.get(slug).copied().unwrap_or(false)
    }

    pub fn mark_processed(&mut self, slug: &str) {
        self.entries.insert(slug.to_string(), true);
    }

    /// Remove a slug so the next run processes it again. Returns whether it
    /// was present.
    pub fn forget(&mut self, slug: &str) -> bool {
        self.entries.remove(slug).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Slugs marked as processed, in sorted order.
    pub fn processed(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, done)| **done)
            .map(|(slug, _)| slug.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.processed().next().is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
