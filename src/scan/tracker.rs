// Scan run bookkeeping
//
// One tracker per run: running -> completed | failed | cancelled, exactly once.
// Finishing consumes the tracker, so a second terminal transition cannot be expressed.
//
// The catalog allows a single `running` row (partial unique index), so the
// one-run-at-a-time rule holds across processes sharing a database file.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::constants::{CHECKPOINT_EVERY_FILES, CHECKPOINT_INTERVAL_SECS, STALE_RUN_AFTER_SECS};
use crate::db::schema::{self, ScanCounters, ScanRun, ScanStatus, ScanTrigger};
use crate::db::Catalog;
use crate::error::{VidshelfError, Result};

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Host identifier recorded on each run (hostname:pid).
pub fn worker_id() -> String {
    format!("{}:{}", host_name(), std::process::id())
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> Option<bool> {
    Some(std::path::Path::new("/proc").join(pid.to_string()).exists())
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> Option<bool> {
    None
}

/// Whether a `running` row has no live scanner behind it: its process on
/// this host has exited, or it has not checkpointed for `STALE_RUN_AFTER_SECS`.
/// Rows owned by this process are never abandoned.
pub fn is_abandoned(run: &ScanRun) -> bool {
    if run.status != ScanStatus::Running {
        return false;
    }

    let host = run.host.as_deref().unwrap_or_default();
    if host == worker_id() {
        return false;
    }

    if let Some((name, pid)) = host.rsplit_once(':') {
        if name == host_name() {
            if let Some(alive) = pid.parse::<u32>().ok().and_then(process_alive) {
                return !alive;
            }
        }
    }

    run.heartbeat_age_secs()
        .map(|age| age > STALE_RUN_AFTER_SECS)
        .unwrap_or(true)
}

/// Close every abandoned run. Live runs, here or in another process, are left alone.
pub fn interrupt_abandoned_runs(catalog: &Catalog) -> Result<usize> {
    catalog.with_transaction(|conn| {
        let mut closed = 0;
        for run in schema::list_running_scan_runs(conn)? {
            if is_abandoned(&run) && schema::interrupt_scan_run(conn, run.id, &run.run_token)? {
                log::warn!(
                    "Scan run {} ({}) was abandoned; marked as failed",
                    run.id,
                    run.host.as_deref().unwrap_or("unknown host")
                );
                closed += 1;
            }
        }
        Ok(closed)
    })
}

fn is_running_conflict(err: &VidshelfError) -> bool {
    matches!(
        err,
        VidshelfError::Database(e) if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

#[derive(Debug)]
pub struct ScanRunTracker {
    id: i64,
    run_token: String,
    trigger: ScanTrigger,
    counters: ScanCounters,
    errors: Vec<String>,
    files_since_checkpoint: i64,
    last_checkpoint: Instant,
}

impl ScanRunTracker {
    /// Insert a new `running` row. Fails with `ScanInProgress` while another
    /// live run holds the catalog; an abandoned one is closed first.
    pub fn open(catalog: &Catalog, trigger: ScanTrigger) -> Result<Self> {
        let run_token = Uuid::new_v4().to_string();
        let host = worker_id();
        let insert = || {
            catalog.with_conn(|conn| schema::insert_scan_run(conn, &run_token, Some(&host), trigger))
        };

        let id = match insert() {
            Err(e) if is_running_conflict(&e) => {
                if interrupt_abandoned_runs(catalog)? == 0 {
                    return Err(VidshelfError::ScanInProgress);
                }
                insert().map_err(|e| {
                    if is_running_conflict(&e) {
                        VidshelfError::ScanInProgress
                    } else {
                        e
                    }
                })?
            }
            other => other?,
        };

        log::info!("Scan run {} started ({} trigger)", id, trigger.as_str());

        Ok(Self {
            id,
            run_token,
            trigger,
            counters: ScanCounters::default(),
            errors: Vec::new(),
            files_since_checkpoint: 0,
            last_checkpoint: Instant::now(),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn counters(&self) -> &ScanCounters {
        &self.counters
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn record_scanned(&mut self) {
        self.counters.scanned += 1;
        self.files_since_checkpoint += 1;
    }

    pub fn record_added(&mut self) {
        self.counters.added += 1;
    }

    pub fn record_updated(&mut self) {
        self.counters.updated += 1;
    }

    /// Set once per run, after the duplicate pass.
    pub fn record_duplicates(&mut self, count: i64) {
        self.counters.duplicates_found = self.counters.duplicates_found.max(count);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("Scan run {}: {}", self.id, message);
        self.errors.push(message);
    }

    /// Persist counters so far and refresh the heartbeat.
    pub fn checkpoint(&mut self, catalog: &Catalog) -> Result<()> {
        catalog.with_conn(|conn| {
            schema::update_scan_run_progress(
                conn,
                self.id,
                &self.run_token,
                &self.counters,
                &self.errors,
            )
        })?;
        self.files_since_checkpoint = 0;
        self.last_checkpoint = Instant::now();
        Ok(())
    }

    /// Checkpoint every `CHECKPOINT_EVERY_FILES` files or `CHECKPOINT_INTERVAL_SECS`.
    pub fn checkpoint_if_due(&mut self, catalog: &Catalog) -> Result<()> {
        if self.files_since_checkpoint >= CHECKPOINT_EVERY_FILES
            || self.last_checkpoint.elapsed() >= Duration::from_secs(CHECKPOINT_INTERVAL_SECS)
        {
            self.checkpoint(catalog)?;
        }
        Ok(())
    }

    pub fn complete(self, catalog: &Catalog) -> Result<ScanRun> {
        self.finish(catalog, ScanStatus::Completed)
    }

    pub fn cancel(mut self, catalog: &Catalog) -> Result<ScanRun> {
        self.errors.push("Scan cancelled before completion".to_string());
        self.finish(catalog, ScanStatus::Cancelled)
    }

    /// Close the run as failed with `reason` appended to its error list.
    pub fn fail(mut self, catalog: &Catalog, reason: impl Into<String>) -> Result<ScanRun> {
        self.record_error(reason);
        self.finish(catalog, ScanStatus::Failed)
    }

    /// A row already closed elsewhere keeps its terminal state and is returned as stored.
    fn finish(self, catalog: &Catalog, status: ScanStatus) -> Result<ScanRun> {
        let (run, finished) = catalog.with_conn(|conn| {
            let finished = schema::finish_scan_run(
                conn,
                self.id,
                &self.run_token,
                status,
                &self.counters,
                &self.errors,
            )?;
            let run = schema::get_scan_run(conn, self.id)?.ok_or(VidshelfError::ScanRunNotFound(self.id))?;
            Ok((run, finished))
        })?;

        if !finished {
            log::warn!(
                "Scan run {} was closed elsewhere as {}; keeping that outcome",
                run.id,
                run.status
            );
            return Ok(run);
        }

        log::info!(
            "Scan run {} ({}) {}: scanned={} added={} updated={} duplicates={} errors={}",
            run.id,
            self.trigger.as_str(),
            run.status,
            run.counters.scanned,
            run.counters.added,
            run.counters.updated,
            run.counters.duplicates_found,
            run.errors.len()
        );

        Ok(run)
    }
}
