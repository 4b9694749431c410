//! Units of work: the thing the runner invokes once per identifier.
//!
//! The runner only sees [`UnitOfWork`]. Two adapters spawn external
//! programs:
//!
//! - [`ProcessUnit`] runs one command with the identifier as an argument.
//! - [`PipelineUnit`] runs an ordered chain of commands (generate text,
//!   synthesize audio, build the image, render the video) and stops at the
//!   first stage that fails or does not leave its declared artifact behind.
//!
//! Commands inherit stdio so their progress shows up in the terminal.
//! Success is exit status 0.

use crate::artifact::{ArtifactKind, ArtifactLocator};
use crate::error::{ReelError, Result};
use crate::secrets::Secrets;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

// ---------------------------------------------------------------------------
// WorkItem / UnitOfWork
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub identifier: String,
    pub slug: String,
}

impl WorkItem {
    pub fn new(identifier: &str) -> Result<Self> {
        Ok(Self {
            identifier: identifier.to_string(),
            slug: crate::paths::slugify(identifier)?,
        })
    }
}

pub trait UnitOfWork {
    /// Short human description, used in logs.
    fn describe(&self) -> String;

    /// Produce everything for one item. Any error counts as a failure.
    fn process(&mut self, item: &WorkItem) -> Result<()>;
}

impl<F> UnitOfWork for F
where
    F: FnMut(&WorkItem) -> Result<()>,
{
    fn describe(&self) -> String {
        "in-process function".to_string()
    }

    fn process(&mut self, item: &WorkItem) -> Result<()> {
        self(item)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub command: Vec<String>,
    /// Artifact this stage must leave behind for the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces: Option<ArtifactKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Single command; `{item}` and `{slug}` are substituted, otherwise the
    /// identifier is appended.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Ordered stages, used instead of `command` when non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageConfig>,
    pub env: BTreeMap<String, String>,
}

impl Default for UnitConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("PYTHONUTF8".to_string(), "1".to_string());
        env.insert("PYTHONIOENCODING".to_string(), "utf-8".to_string());
        Self {
            command: Vec::new(),
            stages: Vec::new(),
            env,
        }
    }
}

/// Everything needed to turn a [`UnitConfig`] into a runnable unit.
pub struct UnitContext<'a> {
    pub root: &'a Path,
    pub secrets: &'a Secrets,
    pub locator: &'a ArtifactLocator,
    pub timeout: Option<Duration>,
}

impl UnitConfig {
    /// Build the configured unit. `override_command`, when non-empty, wins
    /// over both `command` and `stages`.
    pub fn build(
        &self,
        ctx: &UnitContext<'_>,
        override_command: &[String],
    ) -> Result<Box<dyn UnitOfWork>> {
        if !override_command.is_empty() {
            return Ok(Box::new(self.process_unit("command", override_command, ctx)?));
        }
        if !self.stages.is_empty() {
            let mut stages = Vec::with_capacity(self.stages.len());
            for stage in &self.stages {
                let unit = self.process_unit(&stage.name, &stage.command, ctx)?;
                stages.push((unit, stage.produces));
            }
            return Ok(Box::new(PipelineUnit {
                stages,
                locator: ctx.locator.clone(),
            }));
        }
        if !self.command.is_empty() {
            return Ok(Box::new(self.process_unit("command", &self.command, ctx)?));
        }
        Err(ReelError::NoUnitConfigured)
    }

    fn process_unit(
        &self,
        name: &str,
        command: &[String],
        ctx: &UnitContext<'_>,
    ) -> Result<ProcessUnit> {
        let mut unit = ProcessUnit::new(name, command.to_vec(), ctx.root)?;
        unit.env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        unit.env.extend(
            ctx.secrets
                .env_pairs()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        unit.timeout = ctx.timeout;
        Ok(unit)
    }
}

// ---------------------------------------------------------------------------
// ProcessUnit
// ---------------------------------------------------------------------------

pub struct ProcessUnit {
    name: String,
    command: Vec<String>,
    root: PathBuf,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ProcessUnit {
    pub fn new(name: &str, command: Vec<String>, root: &Path) -> Result<Self> {
        match command.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => return Err(ReelError::NoUnitConfigured),
        }
        Ok(Self {
            name: name.to_string(),
            command,
            root: root.to_path_buf(),
            env: Vec::new(),
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Argument vector for one item, placeholders substituted.
    pub fn argv(&self, item: &WorkItem) -> Vec<String> {
        let has_placeholder = self.command[1..]
            .iter()
            .any(|a| a.contains("{item}") || a.contains("{slug}"));
        let mut argv: Vec<String> = self
            .command
            .iter()
            .map(|a| {
                a.replace("{item}", &item.identifier)
                    .replace("{slug}", &item.slug)
            })
            .collect();
        if !has_placeholder {
            argv.push(item.identifier.clone());
        }
        argv
    }

    pub fn run(&self, item: &WorkItem) -> Result<()> {
        let argv = self.argv(item);
        let program = argv[0].clone();
        tracing::debug!(stage = %self.name, ?argv, "spawning unit of work");

        let mut cmd = Command::new(&program);
        cmd.args(&argv[1..])
            .current_dir(&self.root)
            .env("REEL_ROOT", &self.root)
            .env("REEL_ITEM", &item.identifier)
            .env("REEL_SLUG", &item.slug)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        // A timed unit leads its own process group so a timeout also reaches
        // the programs a shell wrapper started.
        #[cfg(unix)]
        if self.timeout.is_some() {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| ReelError::SpawnFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => {
                // Wait on a helper thread so the timeout needs no polling; on
                // expiry the child is killed by pid and the waiter unblocks.
                let pid = child.id();
                let (tx, rx) = std::sync::mpsc::channel();
                std::thread::spawn(move || {
                    let _ = tx.send(child.wait());
                });
                match rx.recv_timeout(timeout) {
                    Ok(result) => result?,
                    Err(_) => {
                        kill_process(pid);
                        return Err(ReelError::UnitTimedOut {
                            program,
                            seconds: timeout.as_secs(),
                        });
                    }
                }
            }
        };

        if !status.success() {
            return Err(ReelError::UnitFailed {
                program,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

impl UnitOfWork for ProcessUnit {
    fn describe(&self) -> String {
        self.command.join(" ")
    }

    fn process(&mut self, item: &WorkItem) -> Result<()> {
        self.run(item)
    }
}

/// Terminate a process and its descendants. Best-effort; errors are ignored.
///
/// On Unix `pid` must lead its own process group.
fn kill_process(pid: u32) {
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("taskkill");
        let pid = pid.to_string();
        c.args(["/PID", pid.as_str(), "/T", "/F"]);
        c
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut c = Command::new("kill");
        let group = format!("-{pid}");
        c.args(["-9", "--", group.as_str()]);
        c
    };
    let _ = cmd.stdout(Stdio::null()).stderr(Stdio::null()).status();
}

// ---------------------------------------------------------------------------
// PipelineUnit
// ---------------------------------------------------------------------------

pub struct PipelineUnit {
    stages: Vec<(ProcessUnit, Option<ArtifactKind>)>,
    locator: ArtifactLocator,
}

impl PipelineUnit {
    pub fn new(
        stages: Vec<(ProcessUnit, Option<ArtifactKind>)>,
        locator: ArtifactLocator,
    ) -> Self {
        Self { stages, locator }
    }
}

impl UnitOfWork for PipelineUnit {
    fn describe(&self) -> String {
        let names: Vec<&str> = self.stages.iter().map(|(s, _)| s.name.as_str()).collect();
        format!("pipeline [{}]", names.join(" -> "))
    }

    fn process(&mut self, item: &WorkItem) -> Result<()> {
        for (stage, produces) in &self.stages {
            tracing::info!(item = %item.identifier, stage = %stage.name, "stage started");
            stage.run(item)?;
            if let Some(kind) = produces {
                let path = self.locator.path(*kind, &item.slug);
                if !path.exists() {
                    return Err(ReelError::MissingArtifact {
                        stage: stage.name.clone(),
                        kind: kind.to_string(),
                        path: path.display().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
