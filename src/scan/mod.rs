// Scan module
//
// One scan run: walk the watched root, reconcile each file against the
// catalog, render previews for new records, recompute duplicate flags and
// close the run record.
//
// Per-file problems land in the run's error list and the walk continues.
// Only an unreachable catalog or an unusable root/preview directory fails the run.

pub mod discover;
pub mod duplicates;
pub mod reconcile;
pub mod tracker;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::ScanConfig;
use crate::db::schema::{self, ScanRun, ScanTrigger};
use crate::db::Catalog;
use crate::error::{VidshelfError, Result};
use crate::preview::{ThumbnailJob, ThumbnailPipeline, Transcoder};
use discover::{describe_file, discover_media_files};
use reconcile::{MovePolicy, ReconcileOutcome, Reconciler};
use tracker::ScanRunTracker;

/// Everything one run needs. Borrowed so tests can hand in fakes.
pub struct ScanContext<'a> {
    pub catalog: &'a Catalog,
    pub transcoder: &'a dyn Transcoder,
    pub move_policy: &'a dyn MovePolicy,
    pub config: &'a ScanConfig,
    pub cancel: Option<&'a AtomicBool>,
}

impl ScanContext<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false)
    }
}

/// Errors that mean the catalog itself is gone; anything else is per-file.
fn is_catalog_failure(err: &VidshelfError) -> bool {
    match err {
        VidshelfError::Database(e) => {
            e.sqlite_error_code() != Some(rusqlite::ErrorCode::ConstraintViolation)
        }
        VidshelfError::LockPoisoned(_) => true,
        _ => false,
    }
}

/// Execute one scan run and return its final record.
///
/// Returns `Err` only when the run record could not be opened or written,
/// `ScanInProgress` included when another scanner holds the catalog.
pub fn run_scan(ctx: &ScanContext<'_>, trigger: ScanTrigger) -> Result<ScanRun> {
    let mut tracker = ScanRunTracker::open(ctx.catalog, trigger)?;

    let watched_root = ctx.config.watched_root();
    if !watched_root.is_dir() {
        let reason = VidshelfError::WatchedRootMissing(watched_root.display().to_string());
        return tracker.fail(ctx.catalog, reason.to_string());
    }

    let thumbnail_dir = ctx.config.thumbnail_dir();
    if ctx.config.generate_thumbnails {
        if !thumbnail_dir.starts_with(&ctx.config.media_root) {
            return tracker.fail(
                ctx.catalog,
                format!(
                    "Thumbnail directory {} is outside the media root {}",
                    thumbnail_dir.display(),
                    ctx.config.media_root.display()
                ),
            );
        }
        if let Err(e) = std::fs::create_dir_all(&thumbnail_dir) {
            return tracker.fail(
                ctx.catalog,
                format!("Cannot create thumbnail directory {}: {}", thumbnail_dir.display(), e),
            );
        }
    }

    log::info!(
        "Scanning {} (move detection: {})",
        watched_root.display(),
        ctx.move_policy.name()
    );

    // Phase 1: discover
    let discovery = discover_media_files(&watched_root, ctx.config);
    for error in discovery.errors {
        tracker.record_error(error);
    }

    // Phase 2: reconcile
    let reconciler = Reconciler::new(
        ctx.catalog,
        ctx.transcoder,
        ctx.move_policy,
        &watched_root,
        ctx.config.fingerprint_budget_bytes,
        ctx.config.probe_metadata,
    );
    let mut thumbnail_jobs: Vec<ThumbnailJob> = Vec::new();
    let mut cancelled = false;

    for path in &discovery.files {
        if ctx.is_cancelled() {
            cancelled = true;
            break;
        }

        tracker.record_scanned();

        let file = match describe_file(&watched_root, path) {
            Ok(f) => f,
            Err(e) => {
                tracker.record_error(format!("Error reading {}: {}", path.display(), e));
                continue;
            }
        };

        match reconciler.reconcile(&file) {
            Ok(report) => {
                for warning in report.warnings {
                    tracker.record_error(warning);
                }
                match report.outcome {
                    ReconcileOutcome::Unchanged { .. } => {}
                    ReconcileOutcome::Resized { .. } | ReconcileOutcome::Moved { .. } => {
                        tracker.record_updated()
                    }
                    ReconcileOutcome::Added { thumbnail, .. } => {
                        tracker.record_added();
                        thumbnail_jobs.push(thumbnail);
                    }
                }
            }
            Err(e) if is_catalog_failure(&e) => {
                return tracker.fail(ctx.catalog, format!("Catalog unavailable: {}", e));
            }
            Err(e) => {
                tracker.record_error(format!("Error processing {}: {}", file.relative_path, e));
            }
        }

        if let Err(e) = tracker.checkpoint_if_due(ctx.catalog) {
            return tracker.fail(ctx.catalog, format!("Catalog unavailable: {}", e));
        }
    }

    // Phase 3: previews for new records
    if ctx.config.generate_thumbnails && !cancelled && !thumbnail_jobs.is_empty() {
        let pipeline = ThumbnailPipeline::new(
            ctx.transcoder,
            &ctx.config.media_root,
            &thumbnail_dir,
            ctx.config.preview.clone(),
            ctx.config.thumbnail_worker_count(),
        );

        let shared = Mutex::new(tracker);
        pipeline.run_batch(thumbnail_jobs, ctx.cancel, |outcome| {
            let error = match outcome.result {
                Ok(relative) => ctx
                    .catalog
                    .with_conn(|conn| schema::set_thumbnail_path(conn, &outcome.job.identity, &relative))
                    .err()
                    .map(|e| format!("Could not store thumbnail for {}: {}", outcome.job.display_name, e)),
                Err(e) => Some(format!("Thumbnail failed for {}: {}", outcome.job.display_name, e)),
            };
            if let Ok(mut t) = shared.lock() {
                if let Some(error) = error {
                    t.record_error(error);
                }
                if let Err(e) = t.checkpoint_if_due(ctx.catalog) {
                    log::warn!("Scan run {}: checkpoint failed: {}", t.id(), e);
                }
            }
        });
        tracker = shared.into_inner()?;
        cancelled = ctx.is_cancelled();
    }

    // Phase 4: duplicates over the whole catalog
    match duplicates::detect_duplicates(ctx.catalog) {
        Ok(flagged) => tracker.record_duplicates(flagged),
        Err(e) => return tracker.fail(ctx.catalog, format!("Duplicate detection failed: {}", e)),
    }

    if cancelled {
        tracker.cancel(ctx.catalog)
    } else {
        tracker.complete(ctx.catalog)
    }
}
