// File discovery under the watched root

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{VidshelfError, Result};
use crate::hash::canonical_relative_path;

/// Result of walking the watched tree. Walk errors (unreadable directories,
/// symlink loops) are collected instead of aborting the walk.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// A media file as seen on disk during this run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredFile {
    pub absolute_path: PathBuf,
    /// Canonical path relative to the watched root, '/'-separated.
    pub relative_path: String,
    pub display_name: String,
    pub byte_size: i64,
}

/// Discover all video files under `root`, sorted by path.
pub fn discover_media_files(root: &Path, config: &ScanConfig) -> Discovery {
    let mut discovery = Discovery::default();

    for entry in WalkDir::new(root).follow_links(true) {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if entry.file_type().is_file() && config.is_video_file(path) {
                    discovery.files.push(path.to_path_buf());
                }
            }
            Err(e) => {
                let location = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                discovery.errors.push(format!("Error walking {}: {}", location, e));
            }
        }
    }

    // Sort by path for consistent ordering
    discovery.files.sort();

    discovery
}

/// Stat a discovered path and derive its catalog-facing fields.
pub fn describe_file(root: &Path, path: &Path) -> Result<DiscoveredFile> {
    let relative = path.strip_prefix(root).map_err(|_| {
        VidshelfError::InvalidPath(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;

    let relative_path = canonical_relative_path(&relative.to_string_lossy());
    if relative_path.is_empty() {
        return Err(VidshelfError::InvalidPath(path.display().to_string()));
    }

    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| VidshelfError::InvalidPath(path.display().to_string()))?;

    let byte_size = std::fs::metadata(path)?.len();
    let byte_size = i64::try_from(byte_size)
        .map_err(|_| VidshelfError::InvalidPath(format!("{} is too large", path.display())))?;

    Ok(DiscoveredFile {
        absolute_path: path.to_path_buf(),
        relative_path,
        display_name,
        byte_size,
    })
}
