//! Artifact locator: where the files for a work item live.
//!
//! Items and their artifacts are correlated only by name. Every artifact for
//! identifier `X` is `<dir>/<slugify(X)>.<ext>`; nothing else in the crate
//! builds these paths.

use crate::error::{ReelError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ArtifactKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Script,
    Audio,
    Image,
    Video,
    Subtitles,
}

impl ArtifactKind {
    pub fn all() -> &'static [ArtifactKind] {
        &[
            ArtifactKind::Script,
            ArtifactKind::Audio,
            ArtifactKind::Image,
            ArtifactKind::Video,
            ArtifactKind::Subtitles,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Script => "script",
            ArtifactKind::Audio => "audio",
            ArtifactKind::Image => "image",
            ArtifactKind::Video => "video",
            ArtifactKind::Subtitles => "subtitles",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub dir: PathBuf,
    pub ext: String,
}

impl ArtifactSpec {
    fn new(dir: &str, ext: &str) -> Self {
        Self {
            dir: PathBuf::from(dir),
            ext: ext.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactLayout {
    pub script: ArtifactSpec,
    pub audio: ArtifactSpec,
    pub image: ArtifactSpec,
    pub video: ArtifactSpec,
    pub subtitles: ArtifactSpec,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            script: ArtifactSpec::new(paths::MEDIA_VIDEOS_DIR, "json"),
            audio: ArtifactSpec::new(paths::MEDIA_AUDIO_DIR, "wav"),
            image: ArtifactSpec::new(paths::MEDIA_IMAGES_DIR, "png"),
            video: ArtifactSpec::new(paths::MEDIA_VIDEOS_DIR, "mp4"),
            subtitles: ArtifactSpec::new(paths::MEDIA_SUBTITLES_DIR, "en.srt"),
        }
    }
}

impl ArtifactLayout {
    pub fn spec(&self, kind: ArtifactKind) -> &ArtifactSpec {
        match kind {
            ArtifactKind::Script => &self.script,
            ArtifactKind::Audio => &self.audio,
            ArtifactKind::Image => &self.image,
            ArtifactKind::Video => &self.video,
            ArtifactKind::Subtitles => &self.subtitles,
        }
    }
}

// ---------------------------------------------------------------------------
// Locator
// ---------------------------------------------------------------------------

/// Layout with every directory already resolved against the project root.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    layout: ArtifactLayout,
}

impl ArtifactLocator {
    pub fn new(root: &Path, layout: &ArtifactLayout) -> Result<Self> {
        let mut resolved = layout.clone();
        for spec in [
            &mut resolved.script,
            &mut resolved.audio,
            &mut resolved.image,
            &mut resolved.video,
            &mut resolved.subtitles,
        ] {
            spec.dir = paths::resolve(root, &spec.dir)?;
        }
        Ok(Self { layout: resolved })
    }

    /// Path of one artifact for an already-slugged item.
    pub fn path(&self, kind: ArtifactKind, slug: &str) -> PathBuf {
        let spec = self.layout.spec(kind);
        spec.dir.join(format!("{slug}.{}", spec.ext))
    }

    /// Every expected artifact path for an identifier.
    pub fn locate(&self, identifier: &str) -> Result<ArtifactPaths> {
        let slug = paths::slugify(identifier)?;
        let entries = ArtifactKind::all()
            .iter()
            .map(|&kind| (kind, self.path(kind, &slug)))
            .collect();
        Ok(ArtifactPaths { slug, entries })
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub slug: String,
    pub entries: Vec<(ArtifactKind, PathBuf)>,
}

// ---------------------------------------------------------------------------
// Existing video search
// ---------------------------------------------------------------------------

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm"];

/// Search `dirs` recursively for a video whose file stem equals `slug`.
/// Directories that do not exist are skipped.
pub fn find_existing_video(dirs: &[PathBuf], slug: &str) -> Result<Option<PathBuf>> {
    for dir in dirs {
        if let Some(found) = search_dir(dir, slug)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn search_dir(dir: &Path, slug: &str) -> Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ReelError::Io(e)),
    };
    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            subdirs.push(path);
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str());
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());
        if let (Some(stem), Some(ext)) = (stem, ext) {
            if stem.to_lowercase() == slug && VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                return Ok(Some(path));
            }
        }
    }
    for sub in subdirs {
        if let Some(found) = search_dir(&sub, slug)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn path_of(found: &ArtifactPaths, kind: ArtifactKind) -> &Path {
        &found.entries.iter().find(|(k, _)| *k == kind).unwrap().1
    }

    #[test]
    fn default_layout_paths() {
        let root = Path::new("/proj");
        let locator = ArtifactLocator::new(root, &ArtifactLayout::default()).unwrap();
        let found = locator.locate("No Matter").unwrap();
        assert_eq!(found.slug, "no_matter");
        assert_eq!(
            path_of(&found, ArtifactKind::Video),
            Path::new("/proj/media/videos/no_matter.mp4")
        );
        assert_eq!(
            path_of(&found, ArtifactKind::Script),
            Path::new("/proj/media/videos/no_matter.json")
        );
        assert_eq!(
            path_of(&found, ArtifactKind::Subtitles),
            Path::new("/proj/media/subtitles/no_matter.en.srt")
        );
    }

    #[test]
    fn locate_is_deterministic() {
        let locator = ArtifactLocator::new(Path::new("/p"), &ArtifactLayout::default()).unwrap();
        let a = locator.locate("Feeds Him").unwrap();
        let b = locator.locate("feeds him").unwrap();
        assert_eq!(a.entries, b.entries);
    }

    #[test]
    fn custom_layout_is_respected() {
        let layout: ArtifactLayout =
            serde_yaml::from_str("audio:\n  dir: /mnt/audio\n  ext: mp3\n").unwrap();
        let locator = ArtifactLocator::new(Path::new("/p"), &layout).unwrap();
        assert_eq!(
            locator.path(ArtifactKind::Audio, "apple"),
            PathBuf::from("/mnt/audio/apple.mp3")
        );
        assert_eq!(
            locator.path(ArtifactKind::Image, "apple"),
            PathBuf::from("/p/media/images/apple.png")
        );
    }

    #[test]
    fn finds_existing_video_recursively() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("uploaded_20250101");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("No_Matter.MP4"), b"").unwrap();
        std::fs::write(dir.path().join("apple.json"), b"{}").unwrap();

        let dirs = vec![dir.path().join("missing"), dir.path().to_path_buf()];
        let found = find_existing_video(&dirs, "no_matter").unwrap();
        assert_eq!(found, Some(nested.join("No_Matter.MP4")));
        assert!(find_existing_video(&dirs, "apple").unwrap().is_none());
    }
}
