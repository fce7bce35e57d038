// Vidshelf Constants
// Changing a hash scheme invalidates stored fingerprints; bump the scheme tag instead of editing it.

// Identity
pub const IDENTITY_SCHEME: &str = "path_v1";

// Content fingerprint
pub const FINGERPRINT_SCHEME: &str = "prefix_v1";
pub const FINGERPRINT_BUDGET_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB
pub const FINGERPRINT_READ_CHUNK: usize = 64 * 1024;

// Paths
pub const PATH_DB_SEPARATOR: char = '/';
pub const VIDSHELF_FOLDER: &str = ".vidshelf";
pub const DB_FILENAME: &str = "vidshelf.db";
pub const VIDEOS_FOLDER: &str = "videos";
pub const THUMBS_FOLDER: &str = "thumbs";
pub const CONFIG_FILENAME: &str = "config.json";

// Scheduling
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 6 * 60 * 60;
pub const SCAN_HISTORY_RETENTION_DAYS: i64 = 30;
pub const CHECKPOINT_EVERY_FILES: i64 = 25;
pub const CHECKPOINT_INTERVAL_SECS: u64 = 30;
/// A running row with no checkpoint for this long belongs to a dead scanner.
pub const STALE_RUN_AFTER_SECS: i64 = 60 * 60;

// Preview settings
pub const THUMB_EXTENSION: &str = "webp";
pub const THUMB_IDENTITY_CHARS: usize = 8;
pub const PREVIEW_WIDTH: u32 = 320;
pub const PREVIEW_DURATION_SECS: f64 = 10.0;
pub const PREVIEW_FPS: u32 = 10;
pub const PREVIEW_QUALITY: u32 = 75;

// Concurrency defaults
pub const DEFAULT_THUMBNAIL_WORKERS: usize = 2;
pub const MAX_THUMBNAIL_WORKERS: usize = 8;
pub const TRANSCODER_TIMEOUT_SECS: u64 = 120;
pub const TRANSCODER_POLL_MILLIS: u64 = 50;

// Database
pub const DB_BUSY_TIMEOUT_MS: u32 = 5000;

// Video extensions picked up by the walker
pub const VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg",
];
