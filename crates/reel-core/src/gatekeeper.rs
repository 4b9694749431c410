//! Gatekeeper: move drop-directory batches into the pending list.
//!
//! A gate pass only queues work when nothing else is in flight: no lock
//! marker and an empty pending list. Drop files are renamed to
//! `processing_<name>` only after the lock is staged and the pending list
//! is written, so a failed pass leaves them to be read again.

use crate::error::Result;
use crate::lock::{self, MarkerState};
use crate::paths;
use crate::pending::PendingList;
use crate::processed::ProcessedState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DeferReason {
    LockHeld { stale: bool },
    PendingNotEmpty { count: usize },
}

impl std::fmt::Display for DeferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeferReason::LockHeld { stale: false } => f.write_str("lock marker present"),
            DeferReason::LockHeld { stale: true } => {
                f.write_str("lock marker present (stale; run 'reel lock release' if no run is active)")
            }
            DeferReason::PendingNotEmpty { count } => {
                write!(f, "pending list still has {count} item(s)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    NothingToDo,
    Deferred { reason: DeferReason },
    Queued { count: usize, files: Vec<String> },
}

impl GateOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            GateOutcome::NothingToDo => 0,
            GateOutcome::Queued { .. } => 2,
            GateOutcome::Deferred { .. } => 3,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DropFile {
    #[serde(default)]
    pending: Vec<String>,
}

struct DropBatch {
    name: String,
    path: PathBuf,
    pending: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Gatekeeper {
    pending_path: PathBuf,
    drop_dir: PathBuf,
    lock_path: PathBuf,
    processed_path: Option<PathBuf>,
    stale_after: Option<chrono::Duration>,
}

impl Gatekeeper {
    pub fn new(
        pending_path: impl Into<PathBuf>,
        drop_dir: impl Into<PathBuf>,
        lock_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pending_path: pending_path.into(),
            drop_dir: drop_dir.into(),
            lock_path: lock_path.into(),
            processed_path: None,
            stale_after: None,
        }
    }

    /// Drop identifiers whose slug is already marked in this state file.
    pub fn skip_processed(mut self, path: impl Into<PathBuf>) -> Self {
        self.processed_path = Some(path.into());
        self
    }

    pub fn stale_after(mut self, limit: Option<chrono::Duration>) -> Self {
        self.stale_after = limit;
        self
    }

    pub fn run(&self) -> Result<GateOutcome> {
        if lock::is_held(&self.lock_path) {
            let stale = self.marker_is_stale()?;
            if stale {
                tracing::warn!(
                    path = %self.lock_path.display(),
                    "lock marker is stale; a run may have crashed"
                );
            }
            tracing::info!(path = %self.lock_path.display(), "lock held, deferring");
            return Ok(GateOutcome::Deferred {
                reason: DeferReason::LockHeld { stale },
            });
        }

        let mut pending = PendingList::load(&self.pending_path)?;
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "pending list not empty, deferring");
            return Ok(GateOutcome::Deferred {
                reason: DeferReason::PendingNotEmpty {
                    count: pending.len(),
                },
            });
        }

        let batches = self.read_drop_files()?;
        let identifiers = batches.iter().flat_map(|b| b.pending.iter().cloned()).collect();
        let identifiers = self.filter_processed(identifiers)?;
        pending.extend_unique(identifiers);
        if pending.is_empty() {
            // Empty or fully processed batches are still consumed.
            self.mark_consumed(&batches)?;
            tracing::info!(dir = %self.drop_dir.display(), "no new identifiers");
            return Ok(GateOutcome::NothingToDo);
        }

        lock::stage(&self.lock_path)?;
        if let Err(e) = pending.save(&self.pending_path) {
            lock::force_release(&self.lock_path)?;
            return Err(e);
        }
        self.mark_consumed(&batches)?;
        tracing::info!(count = pending.len(), "batch queued");
        Ok(GateOutcome::Queued {
            count: pending.len(),
            files: batches.into_iter().map(|b| b.name).collect(),
        })
    }

    fn marker_is_stale(&self) -> Result<bool> {
        let Some(limit) = self.stale_after else {
            return Ok(false);
        };
        let now = chrono::Utc::now();
        Ok(match lock::inspect(&self.lock_path)? {
            MarkerState::Lease(lease) => lease.is_stale(Some(limit), now),
            MarkerState::Opaque {
                modified: Some(modified),
            } => now - modified > limit,
            _ => false,
        })
    }

    /// Read and parse every eligible drop file in filename order. Nothing
    /// is renamed here; see [`Gatekeeper::mark_consumed`].
    fn read_drop_files(&self) -> Result<Vec<DropBatch>> {
        let entries = match std::fs::read_dir(&self.drop_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut candidates: Vec<(String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(paths::PROCESSING_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            candidates.push((name.to_string(), path));
        }
        candidates.sort();

        let mut batches = Vec::new();
        for (name, path) in candidates {
            let data = match std::fs::read_to_string(&path) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "skipping unreadable drop file");
                    continue;
                }
            };
            let file: DropFile = if data.trim().is_empty() {
                DropFile::default()
            } else {
                match serde_json::from_str(&data) {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::warn!(file = %name, error = %e, "skipping unreadable drop file");
                        continue;
                    }
                }
            };
            tracing::info!(file = %name, count = file.pending.len(), "drop file read");
            batches.push(DropBatch {
                name,
                path,
                pending: file.pending,
            });
        }
        Ok(batches)
    }

    /// Rename each ingested file to `processing_<name>`.
    fn mark_consumed(&self, batches: &[DropBatch]) -> Result<()> {
        for batch in batches {
            let renamed = self
                .drop_dir
                .join(format!("{}{}", paths::PROCESSING_PREFIX, batch.name));
            std::fs::rename(&batch.path, &renamed)?;
        }
        Ok(())
    }

    fn filter_processed(&self, identifiers: Vec<String>) -> Result<Vec<String>> {
        let state = match &self.processed_path {
            Some(path) => Some(ProcessedState::load(path)?),
            None => None,
        };
        let mut kept = Vec::new();
        for identifier in identifiers {
            let slug = match paths::slugify(&identifier) {
                Ok(slug) => slug,
                Err(e) => {
                    tracing::warn!(item = %identifier, error = %e, "dropping identifier");
                    continue;
                }
            };
            if state.as_ref().is_some_and(|s| s.is_processed(&slug)) {
                tracing::info!(item = %identifier, "already processed, dropping");
                continue;
            }
            kept.push(identifier);
        }
        Ok(kept)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
