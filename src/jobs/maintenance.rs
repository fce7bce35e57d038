// Catalog maintenance: backfill missing previews, prune old scan history

use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use serde::Serialize;

use crate::config::ScanConfig;
use crate::db::schema::{self, MediaFilter};
use crate::db::Catalog;
use crate::error::Result;
use crate::preview::{ThumbnailJob, ThumbnailPipeline, Transcoder};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailBackfill {
    /// Active records without a preview.
    pub candidates: usize,
    pub generated: usize,
    pub failed: usize,
    /// Candidates whose source file is gone.
    pub missing_source: usize,
}

/// Render previews for non-deleted records that have none and whose source
/// still exists. Records that already have a preview are never touched.
pub fn generate_missing_thumbnails(
    catalog: &Catalog,
    transcoder: &dyn Transcoder,
    config: &ScanConfig,
    cancel: Option<&AtomicBool>,
) -> Result<ThumbnailBackfill> {
    let filter = MediaFilter {
        deleted: Some(false),
        missing_thumbnail: true,
        ..MediaFilter::default()
    };
    let records = catalog.with_conn(|conn| schema::list_media(conn, &filter))?;

    let watched_root = config.watched_root();
    let mut report = ThumbnailBackfill {
        candidates: records.len(),
        ..ThumbnailBackfill::default()
    };

    let mut jobs = Vec::new();
    for record in records {
        let source = watched_root.join(&record.relative_path);
        if !source.is_file() {
            log::warn!("Skipping preview for {}: source file missing", record.relative_path);
            report.missing_source += 1;
            continue;
        }
        jobs.push(ThumbnailJob {
            identity: record.identity,
            display_name: record.display_name,
            source,
            source_duration: record.media_info.and_then(|m| m.duration_secs),
        });
    }

    if jobs.is_empty() {
        return Ok(report);
    }

    let thumbnail_dir = config.thumbnail_dir();
    std::fs::create_dir_all(&thumbnail_dir)?;

    let pipeline = ThumbnailPipeline::new(
        transcoder,
        &config.media_root,
        &thumbnail_dir,
        config.preview.clone(),
        config.thumbnail_worker_count(),
    );

    let tally = Mutex::new((0usize, 0usize));
    pipeline.run_batch(jobs, cancel, |outcome| {
        let stored = outcome.result.and_then(|relative| {
            catalog.with_conn(|conn| schema::set_thumbnail_path(conn, &outcome.job.identity, &relative))
        });
        let ok = match stored {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Preview failed for {}: {}", outcome.job.display_name, e);
                false
            }
        };
        if let Ok(mut t) = tally.lock() {
            if ok {
                t.0 += 1;
            } else {
                t.1 += 1;
            }
        }
    });

    let (generated, failed) = tally.into_inner()?;
    report.generated = generated;
    report.failed = failed;

    log::info!(
        "Preview backfill: {} candidates, {} generated, {} failed, {} missing",
        report.candidates,
        report.generated,
        report.failed,
        report.missing_source
    );
    Ok(report)
}

/// Delete finished scan runs older than `days`. Running runs are kept.
pub fn prune_scan_history(catalog: &Catalog, days: i64) -> Result<usize> {
    let deleted = catalog.with_conn(|conn| schema::delete_scan_runs_older_than(conn, days.max(0)))?;
    if deleted > 0 {
        log::info!("Pruned {} scan runs older than {} days", deleted, days);
    }
    Ok(deleted)
}
