//! Publish: run the configured upload steps, then archive uploaded videos.
//!
//! An upload step marks a finished video by renaming it to
//! `uploaded_<YYYYMMDD>_<name>.<ext>`. Archiving moves every file in the
//! videos directory whose name contains `<name>` (the video, its script,
//! subtitles and the marker itself) into `uploaded_<today>/`.

use crate::config::PublishStep;
use crate::error::{ReelError, Result};
use crate::io;
use crate::paths;
use crate::secrets::Secrets;
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishReport {
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<PathBuf>,
    pub archived: Vec<PathBuf>,
}

/// Run every step in order. The first failing step stops the rest.
pub fn run_steps(root: &Path, steps: &[PublishStep], secrets: &Secrets) -> Result<Vec<String>> {
    let mut done = Vec::with_capacity(steps.len());
    for step in steps {
        let Some((program, args)) = step.command.split_first() else {
            return Err(ReelError::PublishStepFailed(format!(
                "{}: empty command",
                step.name
            )));
        };
        tracing::info!(step = %step.name, "publish step started");
        tracing::debug!(step = %step.name, command = ?step.command, "spawning publish step");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(root)
            .env("REEL_ROOT", root)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (k, v) in secrets.env_pairs() {
            cmd.env(k, v);
        }
        let status = cmd.status().map_err(|e| ReelError::SpawnFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;
        if !status.success() {
            tracing::warn!(step = %step.name, %status, "publish step failed");
            return Err(ReelError::PublishStepFailed(format!(
                "{}: {status}",
                step.name
            )));
        }
        done.push(step.name.clone());
    }
    Ok(done)
}

static UPLOADED_RE: OnceLock<Regex> = OnceLock::new();

fn uploaded_re() -> &'static Regex {
    UPLOADED_RE.get_or_init(|| Regex::new(r"^uploaded_(\d{8})_(.+)\.[^.]+$").unwrap())
}

/// Name part of an `uploaded_<YYYYMMDD>_<name>.<ext>` file, if it is one.
pub fn uploaded_name(file_name: &str) -> Option<&str> {
    uploaded_re()
        .captures(file_name)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
}

/// Archive uploaded videos into `<videos_dir>/uploaded_<today>/`.
///
/// Returns the archive directory and the new paths of moved files. When no
/// marker file is found nothing is created.
pub fn archive_uploaded(videos_dir: &Path, today: NaiveDate) -> Result<(PathBuf, Vec<PathBuf>)> {
    let archive_dir = videos_dir.join(format!(
        "{}{}",
        paths::UPLOADED_PREFIX,
        today.format("%Y%m%d")
    ));
    let files = match list_files(videos_dir) {
        Ok(files) => files,
        Err(ReelError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((archive_dir, Vec::new()))
        }
        Err(e) => return Err(e),
    };

    let names: Vec<String> = files
        .iter()
        .filter_map(|f| uploaded_name(f))
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Ok((archive_dir, Vec::new()));
    }

    let mut moved = Vec::new();
    for file in &files {
        if !names.iter().any(|n| file.contains(n.as_str())) {
            continue;
        }
        let dst = archive_dir.join(file);
        io::move_file(&videos_dir.join(file), &dst)?;
        tracing::info!(file = %file, dir = %archive_dir.display(), "archived");
        moved.push(dst);
    }
    Ok((archive_dir, moved))
}

fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            files.push(name.to_string());
        }
    }
    files.sort();
    Ok(files)
}

/// Run the steps, then archive when enabled.
pub fn publish(
    root: &Path,
    steps: &[PublishStep],
    videos_dir: Option<&Path>,
    secrets: &Secrets,
) -> Result<PublishReport> {
    let mut report = PublishReport {
        steps: run_steps(root, steps, secrets)?,
        ..PublishReport::default()
    };
    if let Some(dir) = videos_dir {
        let today = chrono::Local::now().date_naive();
        let (archive_dir, archived) = archive_uploaded(dir, today)?;
        if !archived.is_empty() {
            report.archive_dir = Some(archive_dir);
        }
        report.archived = archived;
    }
    Ok(report)
}
