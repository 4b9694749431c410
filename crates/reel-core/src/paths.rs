use crate::error::{ReelError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const REEL_DIR: &str = ".reel";
pub const CONFIG_FILE: &str = ".reel/config.yaml";

pub const RUNTIME_DIR: &str = "runtime";
pub const SECRETS_DIR: &str = "secrets";
pub const DROP_DIR: &str = "input/ReadyToBeCreated";

pub const PENDING_FILE: &str = "CreateLater.json";
pub const PROCESSED_FILE: &str = "runtime/processed.json";
pub const HISTORY_FILE: &str = "runtime/history_generated.json";
pub const LOCK_FILE: &str = "runtime/pipeline.lock";

pub const MEDIA_AUDIO_DIR: &str = "media/audio";
pub const MEDIA_IMAGES_DIR: &str = "media/images";
pub const MEDIA_VIDEOS_DIR: &str = "media/videos";
pub const MEDIA_SUBTITLES_DIR: &str = "media/subtitles";

/// Prefix given to drop files once the gatekeeper has ingested them.
pub const PROCESSING_PREFIX: &str = "processing_";

/// Prefix the upload step gives to a video once it is published.
pub const UPLOADED_PREFIX: &str = "uploaded_";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a configured path against the project root.
///
/// Absolute paths are returned unchanged and a leading `~/` expands to the
/// user's home directory.
pub fn resolve(root: &Path, configured: &Path) -> Result<PathBuf> {
    if let Ok(rest) = configured.strip_prefix("~") {
        let home = home::home_dir().ok_or(ReelError::HomeNotFound)?;
        return Ok(home.join(rest));
    }
    if configured.is_absolute() {
        return Ok(configured.to_path_buf());
    }
    Ok(root.join(configured))
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

/// Longest slug produced; longer identifiers are cut.
pub const MAX_SLUG_LEN: usize = 80;

static STRIP_RE: OnceLock<Regex> = OnceLock::new();
static SPACE_RE: OnceLock<Regex> = OnceLock::new();

fn strip_re() -> &'static Regex {
    STRIP_RE.get_or_init(|| Regex::new(r"[^a-z0-9\s]").unwrap())
}

fn space_re() -> &'static Regex {
    SPACE_RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Normalize an identifier into the slug used for artifact filenames and
/// processed-state keys: `"No Matter"` becomes `"no_matter"`.
pub fn slugify(identifier: &str) -> Result<String> {
    let folded: String = identifier
        .trim()
        .to_lowercase()
        .chars()
        .map(fold_accent)
        .collect();
    let stripped = strip_re().replace_all(&folded, "");
    let joined = space_re().replace_all(stripped.trim(), "_");
    let slug: String = joined.chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('_').to_string();
    if slug.is_empty() {
        return Err(ReelError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(slug)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
