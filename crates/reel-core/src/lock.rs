//! Lock marker and advisory lease.
//!
//! The marker's presence is the only signal the gatekeeper checks. When reel
//! writes a marker it stores a [`Lease`] as JSON so a runner can tell a
//! gatekeeper-staged batch from another runner, and recognise a lease
//! abandoned by a crash.
//!
//! There is still a window between checking for the marker and acting on
//! it. Creation uses `create_new`, so two processes racing to create an
//! absent marker cannot both succeed. Nothing stops a process that skips the
//! check entirely.

use crate::error::{ReelError, Result};
use crate::io;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseKind {
    /// Work queued by the gatekeeper, waiting for a runner.
    Staged,
    /// A runner is processing the batch.
    Running,
}

impl std::fmt::Display for LeaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaseKind::Staged => f.write_str("staged"),
            LeaseKind::Running => f.write_str("running"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: Uuid,
    pub kind: LeaseKind,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// What is currently sitting at the marker path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerState {
    Absent,
    Lease(Lease),
    /// Present but not a lease (empty, `locked`, or written by another tool).
    Opaque { modified: Option<DateTime<Utc>> },
}

impl Lease {
    fn new(kind: LeaseKind) -> Self {
        Self {
            owner: Uuid::new_v4(),
            kind,
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.acquired_at
    }

    pub fn is_stale(&self, stale_after: Option<Duration>, now: DateTime<Utc>) -> bool {
        stale_after.is_some_and(|limit| self.age(now) > limit)
    }
}

/// Whether a marker file exists. Content is not inspected.
pub fn is_held(path: &Path) -> bool {
    path.exists()
}

pub fn inspect(path: &Path) -> Result<MarkerState> {
    if !path.exists() {
        return Ok(MarkerState::Absent);
    }
    let data = std::fs::read_to_string(path).unwrap_or_default();
    if let Ok(lease) = serde_json::from_str::<Lease>(&data) {
        return Ok(MarkerState::Lease(lease));
    }
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    Ok(MarkerState::Opaque { modified })
}

/// Write a staged lease for work the gatekeeper just queued.
///
/// Fails with [`ReelError::LockHeld`] if a marker appeared since the caller
/// last checked.
pub fn stage(path: &Path) -> Result<Lease> {
    let lease = Lease::new(LeaseKind::Staged);
    if !create_exclusive(path, &lease)? {
        return Err(held_error(path, &inspect(path)?));
    }
    Ok(lease)
}

/// Remove the marker regardless of who wrote it. Returns whether a marker
/// was present.
pub fn force_release(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Take the marker for a running batch.
///
/// - absent: create a fresh running lease
/// - staged: adopt it, the gatekeeper queued this work for us
/// - running and fresh, or opaque and fresh: [`ReelError::LockHeld`]
/// - stale (older than `stale_after`): take it over with a warning
pub fn acquire(path: &Path, stale_after: Option<Duration>) -> Result<LeaseGuard> {
    let lease = Lease::new(LeaseKind::Running);
    if create_exclusive(path, &lease)? {
        return Ok(LeaseGuard::new(path, lease));
    }

    let now = Utc::now();
    let state = inspect(path)?;
    let takeover = match &state {
        MarkerState::Absent => true,
        MarkerState::Lease(existing) if existing.kind == LeaseKind::Staged => {
            tracing::info!(path = %path.display(), "adopting staged batch");
            true
        }
        MarkerState::Lease(existing) if existing.is_stale(stale_after, now) => {
            tracing::warn!(
                path = %path.display(),
                owner = %existing.owner,
                pid = existing.pid,
                since = %existing.acquired_at,
                "taking over stale lease"
            );
            true
        }
        MarkerState::Opaque {
            modified: Some(modified),
        } if stale_after.is_some_and(|limit| now - *modified > limit) => {
            tracing::warn!(path = %path.display(), "taking over stale lock marker");
            true
        }
        _ => false,
    };
    if !takeover {
        return Err(held_error(path, &state));
    }
    io::write_json(path, &lease)?;
    Ok(LeaseGuard::new(path, lease))
}

fn create_exclusive(path: &Path, lease: &Lease) -> Result<bool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    file.write_all(&serde_json::to_vec_pretty(lease)?)?;
    Ok(true)
}

fn held_error(path: &Path, state: &MarkerState) -> ReelError {
    let (owner, since) = match state {
        MarkerState::Lease(l) => (
            format!("{} {} (pid {})", l.kind, l.owner, l.pid),
            l.acquired_at.to_rfc3339(),
        ),
        MarkerState::Opaque { modified } => (
            "unknown owner".to_string(),
            modified
                .map(|m| m.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
        ),
        MarkerState::Absent => ("nobody".to_string(), "never".to_string()),
    };
    ReelError::LockHeld {
        path: path.display().to_string(),
        owner,
        since,
    }
}

// ---------------------------------------------------------------------------
// LeaseGuard
// ---------------------------------------------------------------------------

/// Held running lease. Released on [`LeaseGuard::release`] or drop; the file
/// is only removed while it still carries our owner id.
#[derive(Debug)]
pub struct LeaseGuard {
    path: PathBuf,
    lease: Lease,
    released: bool,
}

impl LeaseGuard {
    fn new(path: &Path, lease: Lease) -> Self {
        Self {
            path: path.to_path_buf(),
            lease,
            released: false,
        }
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match inspect(&self.path)? {
            MarkerState::Lease(current) if current.owner == self.lease.owner => {
                force_release(&self.path)?;
            }
            MarkerState::Absent => {}
            _ => {
                tracing::warn!(
                    path = %self.path.display(),
                    "lock marker changed owner while running; leaving it in place"
                );
            }
        }
        Ok(())
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock marker");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lock_path(dir: &TempDir) -> PathBuf {
        dir.path().join("runtime/pipeline.lock")
    }

    #[test]
    fn acquire_and_release_absent_marker() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(&dir);
        let guard = acquire(&path, None).unwrap();
        assert!(is_held(&path));
        assert_eq!(guard.lease().kind, LeaseKind::Running);
        guard.release().unwrap();
        assert!(!is_held(&path));
    }

    #[test]
    fn drop_releases_marker() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(&dir);
        {
            let _guard = acquire(&path, None).unwrap();
            assert!(is_held(&path));
        }
        assert!(!is_held(&path));
    }

    #[test]
    fn staged_marker_is_adopted() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(&dir);
        let staged = stage(&path).unwrap();
        let guard = acquire(&path, None).unwrap();
        assert_ne!(guard.lease().owner, staged.owner);
        match inspect(&path).unwrap() {
            MarkerState::Lease(l) => assert_eq!(l.kind, LeaseKind::Running),
            other => panic!("unexpected marker state: {other:?}"),
        }
        guard.release().unwrap();
        assert!(!is_held(&path));
    }

    #[test]
    fn fresh_running_lease_blocks() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(&dir);
        let _first = acquire(&path, None).unwrap();
        let second = acquire(&path, Some(Duration::minutes(30)));
        assert!(matches!(second, Err(ReelError::LockHeld { .. })));
    }

    #[test]
    fn stale_running_lease_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(&dir);
        let old = Lease {
            owner: Uuid::new_v4(),
            kind: LeaseKind::Running,
            pid: 1,
            acquired_at: Utc::now() - Duration::hours(5),
        };
        io::write_json(&path, &old).unwrap();

        assert!(acquire(&path, None).is_err(), "no staleness limit, no takeover");
        let guard = acquire(&path, Some(Duration::minutes(60))).unwrap();
        assert_ne!(guard.lease().owner, old.owner);
    }

    #[test]
    fn opaque_marker_counts_as_held() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(&dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "locked").unwrap();
        assert!(is_held(&path));
        assert!(matches!(inspect(&path).unwrap(), MarkerState::Opaque { .. }));
        assert!(matches!(
            acquire(&path, None),
            Err(ReelError::LockHeld { .. })
        ));
    }

    #[test]
    fn stage_fails_when_marker_exists() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(&dir);
        stage(&path).unwrap();
        assert!(matches!(stage(&path), Err(ReelError::LockHeld { .. })));
    }

    #[test]
    fn release_leaves_foreign_marker() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(&dir);
        let guard = acquire(&path, None).unwrap();
        force_release(&path).unwrap();
        stage(&path).unwrap();
        guard.release().unwrap();
        assert!(is_held(&path), "staged marker from someone else must survive");
    }
}
