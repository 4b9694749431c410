use crate::artifact::ArtifactLayout;
use crate::error::{ReelError, Result};
use crate::paths;
use crate::runner::RetryPolicy;
use crate::secrets::SecretSpec;
use crate::unit::UnitConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: String) -> Self {
        Self {
            level: WarnLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            level: WarnLevel::Error,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// FilesConfig
// ---------------------------------------------------------------------------

/// State file locations. Relative paths are resolved against the project
/// root, `~` against the home directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub pending: PathBuf,
    pub processed: PathBuf,
    /// `null` turns history recording off.
    pub history: Option<PathBuf>,
    pub lock: PathBuf,
    pub drop_dir: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            pending: PathBuf::from(paths::PENDING_FILE),
            processed: PathBuf::from(paths::PROCESSED_FILE),
            history: Some(PathBuf::from(paths::HISTORY_FILE)),
            lock: PathBuf::from(paths::LOCK_FILE),
            drop_dir: PathBuf::from(paths::DROP_DIR),
        }
    }
}

// ---------------------------------------------------------------------------
// RunnerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub track_processed: bool,
    pub skip_existing_videos: bool,
    pub video_dirs: Vec<PathBuf>,
    pub retry: RetryPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            track_processed: false,
            skip_existing_videos: false,
            video_dirs: vec![PathBuf::from(paths::MEDIA_VIDEOS_DIR)],
            retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// LockConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_after_minutes: Option<u32>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_after_minutes: None,
        }
    }
}

impl LockConfig {
    pub fn stale_after(&self) -> Option<chrono::Duration> {
        self.stale_after_minutes
            .map(|m| chrono::Duration::minutes(i64::from(m)))
    }
}

// ---------------------------------------------------------------------------
// PublishConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishStep {
    pub name: String,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub steps: Vec<PublishStep>,
    pub videos_dir: PathBuf,
    pub archive_uploaded: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            videos_dir: PathBuf::from(paths::MEDIA_VIDEOS_DIR),
            archive_uploaded: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub project: ProjectConfig,
    pub files: FilesConfig,
    pub runner: RunnerConfig,
    pub lock: LockConfig,
    pub unit: UnitConfig,
    pub artifacts: ArtifactLayout,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretSpec>,
    pub publish: PublishConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::new("")
    }
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            files: FilesConfig::default(),
            runner: RunnerConfig::default(),
            lock: LockConfig::default(),
            unit: UnitConfig::default(),
            artifacts: ArtifactLayout::default(),
            secrets: Vec::new(),
            publish: PublishConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(ReelError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Resolved paths
    // -----------------------------------------------------------------------

    pub fn pending_path(&self, root: &Path) -> Result<PathBuf> {
        paths::resolve(root, &self.files.pending)
    }

    pub fn processed_path(&self, root: &Path) -> Result<PathBuf> {
        paths::resolve(root, &self.files.processed)
    }

    pub fn history_path(&self, root: &Path) -> Result<Option<PathBuf>> {
        self.files
            .history
            .as_deref()
            .map(|p| paths::resolve(root, p))
            .transpose()
    }

    pub fn lock_path(&self, root: &Path) -> Result<PathBuf> {
        paths::resolve(root, &self.files.lock)
    }

    pub fn drop_dir(&self, root: &Path) -> Result<PathBuf> {
        paths::resolve(root, &self.files.drop_dir)
    }

    pub fn video_dirs(&self, root: &Path) -> Result<Vec<PathBuf>> {
        self.runner
            .video_dirs
            .iter()
            .map(|d| paths::resolve(root, d))
            .collect()
    }

    pub fn publish_videos_dir(&self, root: &Path) -> Result<PathBuf> {
        paths::resolve(root, &self.publish.videos_dir)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. A unit of work must be configured somewhere
        if self.unit.command.is_empty() && self.unit.stages.is_empty() {
            warnings.push(ConfigWarning::warning(
                "no unit.command or unit.stages configured; 'reel run' needs a command after --"
                    .to_string(),
            ));
        }
        if !self.unit.command.is_empty() {
            check_command("unit.command", &self.unit.command, &mut warnings);
        }

        // 2. Every stage needs a command
        let mut stage_names = HashSet::new();
        for stage in &self.unit.stages {
            if !stage_names.insert(stage.name.as_str()) {
                warnings.push(ConfigWarning::warning(format!(
                    "stage '{}' is declared more than once",
                    stage.name
                )));
            }
            check_command(
                &format!("stage '{}'", stage.name),
                &stage.command,
                &mut warnings,
            );
        }

        // 3. Publish steps need commands too
        for step in &self.publish.steps {
            check_command(
                &format!("publish step '{}'", step.name),
                &step.command,
                &mut warnings,
            );
        }

        // 4. Secret env names must be unique
        let mut seen = HashSet::new();
        for secret in &self.secrets {
            if !seen.insert(secret.env.as_str()) {
                warnings.push(ConfigWarning::error(format!(
                    "secret env '{}' is declared more than once",
                    secret.env
                )));
            }
        }

        // 5. Retry settings that do nothing
        let retry = &self.runner.retry;
        if retry.max_retries == 0 && retry.backoff_seconds > 0 {
            warnings.push(ConfigWarning::warning(format!(
                "runner.retry.backoff_seconds={} has no effect without max_retries",
                retry.backoff_seconds
            )));
        }
        if retry.max_retries > 10 {
            warnings.push(ConfigWarning::warning(format!(
                "runner.retry.max_retries={} (>10 is unusual)",
                retry.max_retries
            )));
        }

        // 6. Lock staleness
        if self.lock.stale_after_minutes == Some(0) {
            warnings.push(ConfigWarning::warning(
                "lock.stale_after_minutes=0 makes every lease stale immediately".to_string(),
            ));
        }

        // 7. State files must not collide
        let files = &self.files;
        if files.pending == files.processed
            || files.history.as_ref() == Some(&files.pending)
            || files.lock == files.pending
        {
            warnings.push(ConfigWarning::error(
                "files.pending shares a path with another state file".to_string(),
            ));
        }

        if self.runner.skip_existing_videos && self.runner.video_dirs.is_empty() {
            warnings.push(ConfigWarning::warning(
                "runner.skip_existing_videos is set but runner.video_dirs is empty".to_string(),
            ));
        }

        warnings
    }
}

fn check_command(what: &str, command: &[String], warnings: &mut Vec<ConfigWarning>) {
    let Some(program) = command.first().filter(|p| !p.trim().is_empty()) else {
        warnings.push(ConfigWarning::error(format!("{what} has an empty command")));
        return;
    };
    if !program.contains(std::path::MAIN_SEPARATOR) && which::which(program).is_err() {
        warnings.push(ConfigWarning::warning(format!(
            "{what}: program '{program}' not found on PATH"
        )));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::unit::StageConfig;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("shorts");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.project.name, "shorts");
        assert_eq!(parsed.version, 1);
        assert!(parsed.lock.enabled);
        assert_eq!(parsed.files, FilesConfig::default());
    }

    #[test]
    fn partial_config_uses_defaults() {
        let yaml = "project:\n  name: shorts\nunit:\n  command: [python, run.py]\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.unit.command, vec!["python", "run.py"]);
        assert_eq!(cfg.files.pending, PathBuf::from("CreateLater.json"));
        assert!(!cfg.runner.track_processed);
        assert_eq!(cfg.runner.retry, RetryPolicy::default());
        assert!(cfg.secrets.is_empty());
    }

    #[test]
    fn history_can_be_disabled() {
        let cfg: Config = serde_yaml::from_str("files:\n  history: null\n").unwrap();
        assert!(cfg.history_path(Path::new("/p")).unwrap().is_none());
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(ReelError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("shorts");
        cfg.lock.stale_after_minutes = Some(90);
        cfg.unit.stages.push(StageConfig {
            name: "render".into(),
            command: vec!["sh".into(), "render.sh".into()],
            produces: Some(ArtifactKind::Video),
        });
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.lock.stale_after(), Some(chrono::Duration::minutes(90)));
        assert_eq!(loaded.unit.stages[0].produces, Some(ArtifactKind::Video));
    }

    #[test]
    fn resolved_paths() {
        let cfg = Config::new("shorts");
        let root = Path::new("/proj");
        assert_eq!(
            cfg.pending_path(root).unwrap(),
            PathBuf::from("/proj/CreateLater.json")
        );
        assert_eq!(
            cfg.lock_path(root).unwrap(),
            PathBuf::from("/proj/runtime/pipeline.lock")
        );
        assert_eq!(
            cfg.drop_dir(root).unwrap(),
            PathBuf::from("/proj/input/ReadyToBeCreated")
        );
    }

    #[test]
    fn validate_valid_config_no_errors() {
        let mut cfg = Config::new("shorts");
        cfg.unit.command = vec!["sh".into(), "-c".into(), "true".into()];
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn validate_missing_unit_warns() {
        let cfg = Config::new("shorts");
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("no unit.command")));
    }

    #[test]
    fn validate_empty_stage_command_is_error() {
        let mut cfg = Config::new("shorts");
        cfg.unit.stages.push(StageConfig {
            name: "tts".into(),
            command: vec![],
            produces: None,
        });
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("stage 'tts'")));
    }

    #[test]
    fn validate_unknown_program_warns() {
        let mut cfg = Config::new("shorts");
        cfg.unit.command = vec!["definitely-not-a-real-program-xyz".into()];
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("not found on PATH")));
    }

    #[test]
    fn validate_duplicate_secret_env() {
        let mut cfg = Config::new("shorts");
        cfg.unit.command = vec!["sh".into()];
        for file in ["a.txt", "b.txt"] {
            cfg.secrets.push(SecretSpec {
                env: "GEMINI_API_KEY".into(),
                file: file.into(),
            });
        }
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("GEMINI_API_KEY")));
    }

    #[test]
    fn validate_backoff_without_retries() {
        let mut cfg = Config::new("shorts");
        cfg.unit.command = vec!["sh".into()];
        cfg.runner.retry.backoff_seconds = 30;
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("backoff_seconds=30")));
    }

    #[test]
    fn validate_colliding_state_files() {
        let mut cfg = Config::new("shorts");
        cfg.unit.command = vec!["sh".into()];
        cfg.files.processed = cfg.files.pending.clone();
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("files.pending")));
    }
}
