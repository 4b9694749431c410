pub mod artifacts;
pub mod config;
pub mod gate;
pub mod history;
pub mod init;
pub mod lock;
pub mod pending;
pub mod processed;
pub mod publish;
pub mod run;

use anyhow::Context;
use reel_core::{artifact::ArtifactLocator, config::Config, secrets::Secrets};
use std::path::Path;

// ---------------------------------------------------------------------------
// RunExit: typed non-zero exit codes, turned into a process exit in main
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum RunExit {
    /// A unit of work failed; the pending list keeps it and everything after.
    Halted { item: String, reason: String },
    /// Another batch holds the lock marker.
    LockHeld(String),
    /// Gate queued a batch. Already reported on stdout.
    Queued,
    /// Gate found work in flight. Already reported on stdout.
    Deferred,
}

impl RunExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunExit::Halted { .. } => 1,
            RunExit::Queued => 2,
            RunExit::LockHeld(_) | RunExit::Deferred => 3,
        }
    }

    /// Outcomes that are not errors and were already printed.
    pub fn is_quiet(&self) -> bool {
        matches!(self, RunExit::Queued | RunExit::Deferred)
    }
}

impl std::fmt::Display for RunExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunExit::Halted { item, reason } => {
                write!(f, "batch halted at '{item}': {reason}")
            }
            RunExit::LockHeld(detail) => write!(f, "deferred: {detail}"),
            RunExit::Queued => f.write_str("batch queued"),
            RunExit::Deferred => f.write_str("deferred"),
        }
    }
}

impl std::error::Error for RunExit {}

// ---------------------------------------------------------------------------
// Shared loaders
// ---------------------------------------------------------------------------

pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    Config::load(root).context("failed to load config")
}

pub fn load_secrets(root: &Path, config: &Config) -> anyhow::Result<Secrets> {
    Secrets::load(root, &config.secrets).context("failed to load secrets")
}

pub fn locator(root: &Path, config: &Config) -> anyhow::Result<ArtifactLocator> {
    ArtifactLocator::new(root, &config.artifacts).context("failed to resolve artifact layout")
}
