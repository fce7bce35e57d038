// Job system module
//
// `ScanService` owns everything a scan needs and makes sure only one scan
// (or preview backfill) runs at a time in this process. Scans in other
// processes are excluded by the catalog itself (see `ScanRunTracker::open`).
// The scheduler drives it periodically; external commands call it on demand.

pub mod maintenance;
pub mod scheduler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ScanConfig;
use crate::db::schema::{ScanRun, ScanTrigger};
use crate::db::Catalog;
use crate::error::{VidshelfError, Result};
use crate::preview::Transcoder;
use crate::scan::reconcile::{move_policy, MovePolicy};
use crate::scan::{run_scan, ScanContext};
use maintenance::ThumbnailBackfill;

pub struct ScanService {
    catalog: Arc<Catalog>,
    transcoder: Arc<dyn Transcoder>,
    move_policy: Box<dyn MovePolicy>,
    config: ScanConfig,
    running: AtomicBool,
    cancel: AtomicBool,
}

/// Holds the run slot; releases it on drop, panics included.
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl ScanService {
    pub fn new(catalog: Arc<Catalog>, transcoder: Arc<dyn Transcoder>, config: ScanConfig) -> Self {
        Self {
            catalog,
            transcoder,
            move_policy: move_policy(config.strict_move_detection),
            config,
            running: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        }
    }

    pub fn with_move_policy(mut self, policy: Box<dyn MovePolicy>) -> Self {
        self.move_policy = policy;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the active run to stop after its current file.
    /// Returns false when nothing is running.
    pub fn request_cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.cancel.store(true, Ordering::Relaxed);
        true
    }

    fn acquire(&self) -> Result<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| VidshelfError::ScanInProgress)?;
        self.cancel.store(false, Ordering::Relaxed);
        Ok(RunGuard { running: &self.running })
    }

    /// Run one scan on the calling thread. Fails fast with `ScanInProgress`
    /// if another run holds the slot.
    pub fn scan(&self, trigger: ScanTrigger) -> Result<ScanRun> {
        let _guard = self.acquire()?;
        let ctx = ScanContext {
            catalog: &self.catalog,
            transcoder: self.transcoder.as_ref(),
            move_policy: self.move_policy.as_ref(),
            config: &self.config,
            cancel: Some(&self.cancel),
        };
        run_scan(&ctx, trigger)
    }

    /// Backfill previews for records that lack one. Shares the run slot with scans.
    pub fn generate_missing_thumbnails(&self) -> Result<ThumbnailBackfill> {
        let _guard = self.acquire()?;
        maintenance::generate_missing_thumbnails(
            &self.catalog,
            self.transcoder.as_ref(),
            &self.config,
            Some(&self.cancel),
        )
    }

    pub fn prune_scan_history(&self, days: i64) -> Result<usize> {
        maintenance::prune_scan_history(&self.catalog, days)
    }
}
