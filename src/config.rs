// Scan configuration
//
// Precedence: CLI flags > environment (VIDSHELF_*) > JSON config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_FILENAME, DB_FILENAME, DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_THUMBNAIL_WORKERS,
    FINGERPRINT_BUDGET_BYTES, MAX_THUMBNAIL_WORKERS, THUMBS_FOLDER, TRANSCODER_TIMEOUT_SECS,
    VIDEOS_FOLDER, VIDEO_EXTENSIONS, VIDSHELF_FOLDER,
};
use crate::preview::thumb::PreviewOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Shared media root; thumbnail paths are stored relative to it.
    pub media_root: PathBuf,
    /// Directory tree to scan. Defaults to `<media_root>/videos`.
    pub watched_root: Option<PathBuf>,
    /// Where preview artifacts are written. Defaults to `<media_root>/thumbs`.
    pub thumbnail_dir: Option<PathBuf>,
    /// Catalog database. Defaults to `<media_root>/.vidshelf/vidshelf.db`.
    pub db_path: Option<PathBuf>,
    pub scan_interval_secs: u64,
    pub scan_on_start: bool,
    pub fingerprint_budget_bytes: u64,
    pub probe_metadata: bool,
    pub generate_thumbnails: bool,
    pub thumbnail_workers: usize,
    pub thumbnail_timeout_secs: u64,
    pub preview: PreviewOptions,
    /// Require a fingerprint match on top of name+size before treating a file as moved.
    pub strict_move_detection: bool,
    pub video_extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            watched_root: None,
            thumbnail_dir: None,
            db_path: None,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            scan_on_start: true,
            fingerprint_budget_bytes: FINGERPRINT_BUDGET_BYTES,
            probe_metadata: true,
            generate_thumbnails: true,
            thumbnail_workers: DEFAULT_THUMBNAIL_WORKERS,
            thumbnail_timeout_secs: TRANSCODER_TIMEOUT_SECS,
            preview: PreviewOptions::default(),
            strict_move_detection: false,
            video_extensions: VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl ScanConfig {
    /// Config rooted at `media_root` with every other setting defaulted.
    pub fn for_media_root(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            ..Self::default()
        }
    }

    /// Load from an explicit file, or the per-user config file if one exists,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_file().filter(|p| p.exists()),
        };

        let mut config = match file {
            Some(p) => {
                let raw = std::fs::read_to_string(&p)
                    .with_context(|| format!("Failed to read config {}", p.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid config {}", p.display()))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("VIDSHELF_MEDIA_ROOT") {
            self.media_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VIDSHELF_WATCHED_ROOT") {
            self.watched_root = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("VIDSHELF_THUMBNAIL_DIR") {
            self.thumbnail_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("VIDSHELF_DB_PATH") {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("VIDSHELF_SCAN_INTERVAL_SECS") {
            self.scan_interval_secs = v.parse()
                .with_context(|| format!("VIDSHELF_SCAN_INTERVAL_SECS is not a number: {}", v))?;
        }
        Ok(())
    }

    pub fn watched_root(&self) -> PathBuf {
        self.watched_root
            .clone()
            .unwrap_or_else(|| self.media_root.join(VIDEOS_FOLDER))
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.thumbnail_dir
            .clone()
            .unwrap_or_else(|| self.media_root.join(THUMBS_FOLDER))
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.media_root.join(VIDSHELF_FOLDER).join(DB_FILENAME))
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }

    pub fn thumbnail_timeout(&self) -> Duration {
        Duration::from_secs(self.thumbnail_timeout_secs.max(1))
    }

    /// Worker count clamped to [1, MAX_THUMBNAIL_WORKERS].
    pub fn thumbnail_worker_count(&self) -> usize {
        self.thumbnail_workers.clamp(1, MAX_THUMBNAIL_WORKERS)
    }

    pub fn is_video_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let ext = e.to_lowercase();
                self.video_extensions.iter().any(|v| v.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }
}

/// Per-user config location, e.g. ~/.config/vidshelf/config.json
pub fn default_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "vidshelf")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}
