//! Sequential batch runner.
//!
//! Items are taken from the pending list strictly in order, one at a time.
//! The first item that still fails after its retry budget halts the batch:
//! that item and everything after it are written back as the new pending
//! list, and nothing after it is attempted.
//!
//! With a processed-state path set, items whose slug is already marked are
//! skipped without invoking the unit of work, and each success is flushed to
//! the state file before the next item starts.

use crate::artifact;
use crate::error::Result;
use crate::history::GenerationHistory;
use crate::pending;
use crate::processed::ProcessedState;
use crate::unit::{UnitOfWork, WorkItem};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Per-item retry and timeout policy. The default is a single attempt with
/// no timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` means one attempt total.
    pub max_retries: u32,
    /// Pause between attempts.
    pub backoff_seconds: u64,
    /// Kill a unit of work that runs longer than this. `0` means no limit.
    pub timeout_seconds: u64,
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

// ---------------------------------------------------------------------------
// Outcome / progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Pending list was empty, or every item was skipped.
    NothingToDo { skipped: Vec<String> },
    /// Every item was processed or skipped; the pending list is now empty.
    Completed {
        processed: Vec<String>,
        skipped: Vec<String>,
    },
    /// `failed` could not be processed; `remaining` (starting with `failed`)
    /// was written back as the pending list.
    Halted {
        failed: String,
        reason: String,
        processed: Vec<String>,
        skipped: Vec<String>,
        remaining: Vec<String>,
    },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, BatchOutcome::Halted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyProcessed,
    VideoExists,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyProcessed => f.write_str("already processed"),
            SkipReason::VideoExists => f.write_str("video already exists"),
        }
    }
}

/// Events reported to the caller while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<'a> {
    Started {
        index: usize,
        total: usize,
        identifier: &'a str,
    },
    Skipped {
        identifier: &'a str,
        reason: SkipReason,
    },
    Retrying {
        identifier: &'a str,
        attempt: u32,
        reason: String,
    },
    Succeeded {
        identifier: &'a str,
    },
    Failed {
        identifier: &'a str,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// BatchRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchRunner {
    pending_path: PathBuf,
    processed_path: Option<PathBuf>,
    history_path: Option<PathBuf>,
    video_dirs: Vec<PathBuf>,
    retry: RetryPolicy,
}

impl BatchRunner {
    pub fn new(pending_path: impl Into<PathBuf>) -> Self {
        Self {
            pending_path: pending_path.into(),
            processed_path: None,
            history_path: None,
            video_dirs: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Skip slugs already in this state file and mark each success in it.
    pub fn track_processed(mut self, path: impl Into<PathBuf>) -> Self {
        self.processed_path = Some(path.into());
        self
    }

    /// Record attempt outcomes in this generation history file.
    pub fn record_history(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    /// Skip items whose video already exists somewhere under `dirs`.
    pub fn skip_existing_videos(mut self, dirs: Vec<PathBuf>) -> Self {
        self.video_dirs = dirs;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn run<U: UnitOfWork + ?Sized>(&self, unit: &mut U) -> Result<BatchOutcome> {
        self.run_with(unit, &mut |_: &Progress<'_>| {})
    }

    pub fn run_with<U: UnitOfWork + ?Sized>(
        &self,
        unit: &mut U,
        progress: &mut dyn FnMut(&Progress<'_>),
    ) -> Result<BatchOutcome> {
        let items = pending::load_pending(&self.pending_path)?;
        if items.is_empty() {
            tracing::info!(path = %self.pending_path.display(), "nothing to process");
            return Ok(BatchOutcome::NothingToDo {
                skipped: Vec::new(),
            });
        }

        let mut state = match &self.processed_path {
            Some(path) => Some(ProcessedState::load(path)?),
            None => None,
        };
        let mut history = match &self.history_path {
            Some(path) => Some(GenerationHistory::load(path)?),
            None => None,
        };

        tracing::info!(count = items.len(), unit = %unit.describe(), "batch started");

        let total = items.len();
        let mut processed = Vec::new();
        let mut skipped = Vec::new();

        for (index, identifier) in items.iter().enumerate() {
            let attempt = WorkItem::new(identifier).and_then(|item| {
                if let Some(reason) = self.skip_reason(state.as_ref(), &item)? {
                    return Ok(Some(reason));
                }
                progress(&Progress::Started {
                    index: index + 1,
                    total,
                    identifier,
                });
                self.attempt(unit, &item, history.as_mut(), progress)?;
                if let (Some(state), Some(path)) = (state.as_mut(), &self.processed_path) {
                    state.mark_processed(&item.slug);
                    state.save(path)?;
                }
                Ok(None)
            });

            match attempt {
                Ok(Some(reason)) => {
                    tracing::info!(item = %identifier, %reason, "skipped");
                    progress(&Progress::Skipped { identifier, reason });
                    skipped.push(identifier.clone());
                }
                Ok(None) => {
                    tracing::info!(item = %identifier, "processed");
                    progress(&Progress::Succeeded { identifier });
                    if let Some(history) = history.as_mut() {
                        history.record_success(identifier);
                        self.save_history(history);
                    }
                    processed.push(identifier.clone());
                }
                Err(e) => {
                    let reason = e.to_string();
                    tracing::warn!(item = %identifier, %reason, "batch halted");
                    progress(&Progress::Failed {
                        identifier,
                        reason: reason.clone(),
                    });
                    if let Some(history) = history.as_mut() {
                        history.record_failure(identifier, &reason);
                        self.save_history(history);
                    }
                    let remaining = items[index..].to_vec();
                    pending::save_pending(&self.pending_path, &remaining)?;
                    return Ok(BatchOutcome::Halted {
                        failed: identifier.clone(),
                        reason,
                        processed,
                        skipped,
                        remaining,
                    });
                }
            }
        }

        pending::save_pending(&self.pending_path, &[])?;
        if processed.is_empty() {
            return Ok(BatchOutcome::NothingToDo { skipped });
        }
        Ok(BatchOutcome::Completed { processed, skipped })
    }

    fn skip_reason(
        &self,
        state: Option<&ProcessedState>,
        item: &WorkItem,
    ) -> Result<Option<SkipReason>> {
        if state.is_some_and(|s| s.is_processed(&item.slug)) {
            return Ok(Some(SkipReason::AlreadyProcessed));
        }
        if !self.video_dirs.is_empty()
            && artifact::find_existing_video(&self.video_dirs, &item.slug)?.is_some()
        {
            return Ok(Some(SkipReason::VideoExists));
        }
        Ok(None)
    }

    fn attempt<U: UnitOfWork + ?Sized>(
        &self,
        unit: &mut U,
        item: &WorkItem,
        mut history: Option<&mut GenerationHistory>,
        progress: &mut dyn FnMut(&Progress<'_>),
    ) -> Result<()> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            match unit.process(item) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        item = %item.identifier,
                        attempt,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    if let Some(history) = history.as_deref_mut() {
                        history.record_failure(&item.identifier, &e.to_string());
                        self.save_history(history);
                    }
                    progress(&Progress::Retrying {
                        identifier: &item.identifier,
                        attempt,
                        reason: e.to_string(),
                    });
                    std::thread::sleep(self.retry.backoff());
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// History is a record, not a checkpoint: a failed write never stops
    /// the batch.
    fn save_history(&self, history: &GenerationHistory) {
        let Some(path) = &self.history_path else {
            return;
        };
        if let Err(e) = history.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write history");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReelError;
    use crate::pending::{load_pending, save_pending};
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn failing_on(
        name: &'static str,
        msg: &'static str,
    ) -> impl FnMut(&WorkItem) -> Result<()> {
        move |item| {
            if item.identifier == name {
                Err(fail(msg))
            } else {
                Ok(())
            }
        }
    }

    fn fail(msg: &str) -> ReelError {
        ReelError::UnitFailed {
            program: "test".into(),
            status: msg.into(),
        }
    }

    #[test]
    fn empty_pending_is_nothing_to_do() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        let mut calls = 0;
        let outcome = BatchRunner::new(&path)
            .run(&mut |_: &WorkItem| -> Result<()> {
                calls += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(outcome, BatchOutcome::NothingToDo { skipped: vec![] });
        assert_eq!(calls, 0);
        assert!(!path.exists(), "absent pending file stays absent");
    }

    #[test]
    fn all_success_empties_pending() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        save_pending(&path, &ids(&["apple", "banana"])).unwrap();

        let seen = RefCell::new(Vec::new());
        let outcome = BatchRunner::new(&path)
            .run(&mut |item: &WorkItem| -> Result<()> {
                seen.borrow_mut().push(item.identifier.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(*seen.borrow(), ids(&["apple", "banana"]));
        assert!(outcome.is_success());
        assert!(load_pending(&path).unwrap().is_empty());
    }

    #[test]
    fn failure_keeps_failed_and_unattempted_items() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        save_pending(&path, &ids(&["A", "B", "C"])).unwrap();

        let seen = RefCell::new(Vec::new());
        let outcome = BatchRunner::new(&path)
            .run(&mut |item: &WorkItem| -> Result<()> {
                seen.borrow_mut().push(item.identifier.clone());
                if item.identifier == "B" {
                    Err(fail("exit status: 1"))
                } else {
                    Ok(())
                }
            })
            .unwrap();

        assert_eq!(*seen.borrow(), ids(&["A", "B"]), "C is never attempted");
        assert_eq!(load_pending(&path).unwrap(), ids(&["B", "C"]));
        match outcome {
            BatchOutcome::Halted {
                failed,
                processed,
                remaining,
                ..
            } => {
                assert_eq!(failed, "B");
                assert_eq!(processed, ids(&["A"]));
                assert_eq!(remaining, ids(&["B", "C"]));
            }
            other => panic!("expected halt, got {other:?}"),
        }
    }

    #[test]
    fn apple_banana_scenario() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        std::fs::write(&path, r#"{"pending": ["apple", "banana"]}"#).unwrap();

        let outcome = BatchRunner::new(&path)
            .run(&mut failing_on("banana", "boom"))
            .unwrap();

        assert!(!outcome.is_success());
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"pending": ["banana"]}));
    }

    #[test]
    fn processed_items_are_skipped_without_invocation() {
        let dir = TempDir::new().unwrap();
        let pending_path = dir.path().join("CreateLater.json");
        let state_path = dir.path().join("runtime/processed.json");
        save_pending(&pending_path, &ids(&["Apple"])).unwrap();
        let mut state = ProcessedState::default();
        state.mark_processed("apple");
        state.save(&state_path).unwrap();

        let mut calls = 0;
        let outcome = BatchRunner::new(&pending_path)
            .track_processed(&state_path)
            .run(&mut |_: &WorkItem| -> Result<()> {
                calls += 1;
                Ok(())
            })
            .unwrap();

        assert_eq!(calls, 0);
        assert_eq!(
            outcome,
            BatchOutcome::NothingToDo {
                skipped: ids(&["Apple"])
            }
        );
    }

    #[test]
    fn processed_state_is_flushed_before_next_item() {
        let dir = TempDir::new().unwrap();
        let pending_path = dir.path().join("CreateLater.json");
        let state_path = dir.path().join("runtime/processed.json");
        save_pending(&pending_path, &ids(&["apple", "banana"])).unwrap();

        let state_for_check = state_path.clone();
        let outcome = BatchRunner::new(&pending_path)
            .track_processed(&state_path)
            .run(&mut |item: &WorkItem| -> Result<()> {
                if item.identifier == "banana" {
                    // A crash here must not lose apple's progress.
                    let on_disk = ProcessedState::load(&state_for_check)?;
                    assert!(on_disk.is_processed("apple"));
                    assert!(!on_disk.is_processed("banana"));
                }
                Ok(())
            })
            .unwrap();

        assert!(matches!(outcome, BatchOutcome::Completed { .. }));
        let state = ProcessedState::load(&state_path).unwrap();
        assert!(state.is_processed("apple"));
        assert!(state.is_processed("banana"));
    }

    #[test]
    fn failed_item_is_not_marked_processed() {
        let dir = TempDir::new().unwrap();
        let pending_path = dir.path().join("CreateLater.json");
        let state_path = dir.path().join("processed.json");
        save_pending(&pending_path, &ids(&["apple"])).unwrap();

        BatchRunner::new(&pending_path)
            .track_processed(&state_path)
            .run(&mut |_: &WorkItem| -> Result<()> { Err(fail("boom")) })
            .unwrap();

        assert!(!ProcessedState::load(&state_path).unwrap().is_processed("apple"));
    }

    #[test]
    fn retry_policy_allows_recovery() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        save_pending(&path, &ids(&["apple"])).unwrap();

        let mut calls = 0;
        let outcome = BatchRunner::new(&path)
            .retry(RetryPolicy {
                max_retries: 1,
                ..RetryPolicy::default()
            })
            .run(&mut |_: &WorkItem| -> Result<()> {
                calls += 1;
                if calls == 1 {
                    Err(fail("flaky"))
                } else {
                    Ok(())
                }
            })
            .unwrap();

        assert_eq!(calls, 2);
        assert!(matches!(outcome, BatchOutcome::Completed { .. }));
        assert!(load_pending(&path).unwrap().is_empty());
    }

    #[test]
    fn default_policy_does_not_retry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        save_pending(&path, &ids(&["apple"])).unwrap();

        let mut calls = 0;
        BatchRunner::new(&path)
            .run(&mut |_: &WorkItem| -> Result<()> {
                calls += 1;
                Err(fail("boom"))
            })
            .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn invalid_identifier_halts_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        save_pending(&path, &ids(&["apple", "???", "banana"])).unwrap();

        let outcome = BatchRunner::new(&path)
            .run(&mut |_: &WorkItem| -> Result<()> { Ok(()) })
            .unwrap();
        assert!(matches!(outcome, BatchOutcome::Halted { ref failed, .. } if failed == "???"));
        assert_eq!(load_pending(&path).unwrap(), ids(&["???", "banana"]));
    }

    #[test]
    fn existing_video_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        let videos = dir.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        std::fs::write(videos.join("no_matter.mp4"), b"").unwrap();
        save_pending(&path, &ids(&["no matter", "apple"])).unwrap();

        let seen = RefCell::new(Vec::new());
        let outcome = BatchRunner::new(&path)
            .skip_existing_videos(vec![videos])
            .run(&mut |item: &WorkItem| -> Result<()> {
                seen.borrow_mut().push(item.identifier.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(*seen.borrow(), ids(&["apple"]));
        assert_eq!(
            outcome,
            BatchOutcome::Completed {
                processed: ids(&["apple"]),
                skipped: ids(&["no matter"]),
            }
        );
    }

    #[test]
    fn history_records_outcomes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        let history_path = dir.path().join("runtime/history.json");
        save_pending(&path, &ids(&["apple", "banana"])).unwrap();

        BatchRunner::new(&path)
            .record_history(&history_path)
            .run(&mut failing_on("banana", "tts quota"))
            .unwrap();

        let history = GenerationHistory::load(&history_path).unwrap();
        assert!(!history.get("apple").unwrap().error);
        let banana = history.get("banana").unwrap();
        assert!(banana.error);
        assert!(banana
            .error_detail
            .as_ref()
            .unwrap()
            .msg_error
            .contains("tts quota"));
    }

    #[test]
    fn unwritable_history_does_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        std::fs::write(dir.path().join("runtime"), "").unwrap();
        save_pending(&path, &ids(&["apple", "banana"])).unwrap();

        let outcome = BatchRunner::new(&path)
            .record_history(dir.path().join("runtime/history.json"))
            .run(&mut |_: &WorkItem| -> Result<()> { Ok(()) })
            .unwrap();

        assert_eq!(
            outcome,
            BatchOutcome::Completed {
                processed: ids(&["apple", "banana"]),
                skipped: vec![],
            }
        );
        assert!(load_pending(&path).unwrap().is_empty());
    }

    #[test]
    fn progress_events_are_ordered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CreateLater.json");
        save_pending(&path, &ids(&["apple", "banana"])).unwrap();

        let mut events = Vec::new();
        BatchRunner::new(&path)
            .run_with(
                &mut failing_on("banana", "boom"),
                &mut |p: &Progress<'_>| {
                    events.push(match p {
                        Progress::Started { index, total, .. } => format!("start {index}/{total}"),
                        Progress::Succeeded { identifier } => format!("ok {identifier}"),
                        Progress::Failed { identifier, .. } => format!("fail {identifier}"),
                        other => format!("{other:?}"),
                    })
                },
            )
            .unwrap();
        assert_eq!(
            events,
            vec!["start 1/2", "ok apple", "start 2/2", "fail banana"]
        );
    }

    #[test]
    fn retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.timeout(), None);
        let policy: RetryPolicy = serde_yaml::from_str("timeout_seconds: 90\n").unwrap();
        assert_eq!(policy.timeout(), Some(Duration::from_secs(90)));
    }
}
