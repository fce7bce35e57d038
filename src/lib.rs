// Vidshelf - Library Entry Point
//
// Keeps a catalog of the video files under one watched directory: stable
// identities, content fingerprints, move detection, duplicate hints and
// animated previews. The `vidshelf` binary and any other front end drive it
// through `commands` and `jobs`.

pub mod constants;
pub mod error;
pub mod config;
pub mod tools;
pub mod db;
pub mod hash;
pub mod metadata;
pub mod preview;
pub mod scan;
pub mod jobs;
pub mod commands;

pub use config::ScanConfig;
pub use db::Catalog;
pub use error::{VidshelfError, Result};
pub use jobs::scheduler::Scheduler;
pub use jobs::ScanService;
pub use preview::{FfmpegTranscoder, Transcoder};
