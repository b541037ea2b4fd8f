//! Inbox scanning.
//!
//! The pipeline picks up audio files dropped into the inbox directory,
//! identifies each by a content hash, and moves processed files into a
//! `processed/` subdirectory so a rerun never sees them again.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

const AUDIO_EXTENSIONS: &[&str] = &["m4a", "mp3", "wav", "ogg", "flac", "webm", "mp4"];

/// One audio file awaiting processing
#[derive(Debug, Clone)]
pub struct InboxItem {
    pub path: PathBuf,
    /// Hex SHA-256 of the file content
    pub hash: String,
}

impl InboxItem {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Hex SHA-256 of a file's content
pub fn content_hash(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading audio file {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// List the inbox's audio files, sorted by name for a reproducible order.
/// A missing inbox directory is an empty inbox.
pub fn scan(dir: &Path) -> Result<Vec<InboxItem>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading inbox {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_audio(path))
        .collect();
    paths.sort();

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let hash = content_hash(&path)?;
        debug!(path = %path.display(), %hash, "Found inbox item");
        items.push(InboxItem { path, hash });
    }

    Ok(items)
}

/// Move a processed file into `<inbox>/processed/`, returning its new path
pub fn archive(item: &InboxItem) -> Result<PathBuf> {
    let parent = item
        .path
        .parent()
        .context("inbox item has no parent directory")?;
    let processed_dir = parent.join("processed");
    std::fs::create_dir_all(&processed_dir)
        .with_context(|| format!("creating {}", processed_dir.display()))?;

    let target = processed_dir.join(item.file_name());
    std::fs::rename(&item.path, &target)
        .with_context(|| format!("archiving {}", item.path.display()))?;
    Ok(target)
}
