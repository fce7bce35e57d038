// Preview pipeline module
//
// Produces one preview artifact per media file through an external transcoder.
// A failed preview never fails the scan: callers get a per-file outcome.

pub mod thumb;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::constants::{PATH_DB_SEPARATOR, THUMB_EXTENSION, THUMB_IDENTITY_CHARS};
use crate::error::{VidshelfError, Result};
use crate::metadata::MediaInfo;
use thumb::PreviewOptions;

/// The external transcoder seam. Production uses ffmpeg/ffprobe;
/// tests inject a fake.
pub trait Transcoder: Send + Sync {
    /// Probe technical metadata for a media file.
    fn probe(&self, source: &Path) -> Result<MediaInfo>;

    /// Render a preview of `source` into `output`.
    fn render_preview(
        &self,
        source: &Path,
        output: &Path,
        options: &PreviewOptions,
        source_duration: Option<f64>,
    ) -> Result<()>;
}

/// ffmpeg/ffprobe subprocess transcoder with a per-call timeout.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    /// Resolve tool paths the usual way (env override, sidecar, PATH).
    pub fn new(timeout: Duration) -> Self {
        Self::with_paths(crate::tools::ffmpeg_path(), crate::tools::ffprobe_path(), timeout)
    }

    pub fn with_paths(ffmpeg: PathBuf, ffprobe: PathBuf, timeout: Duration) -> Self {
        Self { ffmpeg, ffprobe, timeout }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn probe(&self, source: &Path) -> Result<MediaInfo> {
        crate::metadata::ffprobe::probe(&self.ffprobe, source, self.timeout)
    }

    fn render_preview(
        &self,
        source: &Path,
        output: &Path,
        options: &PreviewOptions,
        source_duration: Option<f64>,
    ) -> Result<()> {
        thumb::render_preview(&self.ffmpeg, source, output, options, source_duration, self.timeout)
    }
}

/// Artifact file name: `<stem>-<identity prefix>.<ext>`. Two records never
/// share an artifact, even when their sources share a base name.
pub fn thumbnail_file_name(display_name: &str, identity: &str) -> String {
    let stem = Path::new(display_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| display_name.to_string());
    let suffix: String = identity.chars().take(THUMB_IDENTITY_CHARS).collect();
    format!("{}-{}.{}", stem, suffix, THUMB_EXTENSION)
}

/// Convert an absolute path under the media root to the stored relative form.
pub fn to_relative_path(media_root: &Path, absolute_path: &Path) -> Result<String> {
    let relative = absolute_path.strip_prefix(media_root).map_err(|_| {
        VidshelfError::InvalidPath(format!(
            "{} is outside the media root {}",
            absolute_path.display(),
            media_root.display()
        ))
    })?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(&PATH_DB_SEPARATOR.to_string()))
}

/// One preview to render.
#[derive(Debug, Clone)]
pub struct ThumbnailJob {
    pub identity: String,
    pub display_name: String,
    pub source: PathBuf,
    pub source_duration: Option<f64>,
}

/// Result of one job. `result` holds the media-root-relative artifact path.
#[derive(Debug)]
pub struct ThumbnailOutcome {
    pub job: ThumbnailJob,
    pub result: Result<String>,
}

/// Renders previews into `thumbnail_dir` on a bounded worker pool.
pub struct ThumbnailPipeline<'a> {
    transcoder: &'a dyn Transcoder,
    media_root: PathBuf,
    thumbnail_dir: PathBuf,
    options: PreviewOptions,
    workers: usize,
}

impl<'a> ThumbnailPipeline<'a> {
    pub fn new(
        transcoder: &'a dyn Transcoder,
        media_root: &Path,
        thumbnail_dir: &Path,
        options: PreviewOptions,
        workers: usize,
    ) -> Self {
        Self {
            transcoder,
            media_root: media_root.to_path_buf(),
            thumbnail_dir: thumbnail_dir.to_path_buf(),
            options,
            workers: workers.max(1),
        }
    }

    /// Render a single preview; returns the relative path to store on the record.
    pub fn generate(&self, job: &ThumbnailJob) -> Result<String> {
        if !job.source.is_file() {
            return Err(VidshelfError::InvalidPath(format!(
                "Source file not found: {}",
                job.source.display()
            )));
        }

        let output = self
            .thumbnail_dir
            .join(thumbnail_file_name(&job.display_name, &job.identity));
        let relative = to_relative_path(&self.media_root, &output)?;
        self.transcoder
            .render_preview(&job.source, &output, &self.options, job.source_duration)?;

        Ok(relative)
    }

    /// Render every job, at most `workers` at a time. `on_done` runs on the
    /// worker thread as each job finishes. Jobs not yet started when `cancel`
    /// is raised are skipped. Returns the number of jobs attempted.
    pub fn run_batch<F>(&self, jobs: Vec<ThumbnailJob>, cancel: Option<&AtomicBool>, on_done: F) -> usize
    where
        F: Fn(ThumbnailOutcome) + Sync,
    {
        if jobs.is_empty() {
            return 0;
        }

        let worker_count = self.workers.min(jobs.len());
        let queue = Mutex::new(jobs.into_iter().collect::<VecDeque<_>>());
        let attempted = Mutex::new(0usize);

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| loop {
                    if cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false) {
                        return;
                    }

                    let job = match queue.lock() {
                        Ok(mut q) => q.pop_front(),
                        Err(_) => return,
                    };
                    let Some(job) = job else { return };

                    let result = self.generate(&job);
                    if let Ok(mut n) = attempted.lock() {
                        *n += 1;
                    }
                    on_done(ThumbnailOutcome { job, result });
                });
            }
        });

        attempted.into_inner().unwrap_or(0)
    }
}
