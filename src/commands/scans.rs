// Scan commands
// Run history, on-demand scans and maintenance triggers

use crate::db::schema::{self, ScanRun, ScanTrigger};
use crate::db::Catalog;
use crate::error::{VidshelfError, Result};
use crate::jobs::maintenance::ThumbnailBackfill;
use crate::jobs::ScanService;
use super::validate_page;

pub fn latest_scan_run(catalog: &Catalog) -> Result<Option<ScanRun>> {
    catalog.with_conn(schema::latest_scan_run)
}

pub fn get_scan_run(catalog: &Catalog, id: i64) -> Result<ScanRun> {
    catalog.with_conn(|conn| schema::get_scan_run(conn, id)?.ok_or(VidshelfError::ScanRunNotFound(id)))
}

/// Most recent runs first.
pub fn scan_history(catalog: &Catalog, limit: i64) -> Result<Vec<ScanRun>> {
    validate_page(Some(limit), None)?;
    catalog.with_conn(|conn| schema::list_scan_runs(conn, limit))
}

/// Start a scan now and wait for it. Rejected with `ScanInProgress` while
/// another run is active.
pub fn trigger_scan(service: &ScanService) -> Result<ScanRun> {
    service.scan(ScanTrigger::Manual)
}

/// Ask the active run to stop. Returns false when nothing is running.
pub fn cancel_scan(service: &ScanService) -> bool {
    service.request_cancel()
}

pub fn generate_missing_thumbnails(service: &ScanService) -> Result<ThumbnailBackfill> {
    service.generate_missing_thumbnails()
}

pub fn prune_scan_history(service: &ScanService, days: i64) -> Result<usize> {
    if days < 0 {
        return Err(VidshelfError::Validation(format!("Retention must be non-negative, got {}", days)));
    }
    service.prune_scan_history(days)
}
