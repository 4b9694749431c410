use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReelError {
    #[error("not initialized: run 'reel init'")]
    NotInitialized,

    #[error("invalid identifier '{0}': slug would be empty")]
    InvalidIdentifier(String),

    #[error("malformed pending list {path}: {reason}")]
    MalformedPending { path: String, reason: String },

    #[error("lock held at {path} by {owner} since {since}")]
    LockHeld {
        path: String,
        owner: String,
        since: String,
    },

    #[error("no unit of work configured: set unit.command or unit.stages in .reel/config.yaml")]
    NoUnitConfigured,

    #[error("failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("'{program}' exited with {status}")]
    UnitFailed { program: String, status: String },

    #[error("'{program}' timed out after {seconds}s")]
    UnitTimedOut { program: String, seconds: u64 },

    #[error("stage '{stage}' did not produce {kind} artifact at {path}")]
    MissingArtifact {
        stage: String,
        kind: String,
        path: String,
    },

    #[error("secret file for {env} not found: {path}")]
    SecretNotFound { env: String, path: String },

    #[error("publish step '{0}' failed")]
    PublishStepFailed(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReelError>;
