// Periodic scan scheduler
//
// One background thread: optional startup scan, then a scan every interval.
// The thread waits on a control channel with a timeout, so `stop` wakes it
// immediately instead of waiting out the interval.

use std::sync::mpsc::{self, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::constants::SCAN_HISTORY_RETENTION_DAYS;
use crate::db::schema::{ScanRun, ScanTrigger};
use crate::error::{VidshelfError, Result};
use crate::scan::tracker::interrupt_abandoned_runs;
use super::ScanService;

enum Control {
    Stop,
}

pub struct Scheduler {
    service: Arc<ScanService>,
    interval: Duration,
    scan_on_start: bool,
    control: Option<Sender<Control>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Interval and startup behaviour come from the service's config.
    pub fn new(service: Arc<ScanService>) -> Self {
        let interval = service.config().scan_interval();
        let scan_on_start = service.config().scan_on_start;
        Self {
            service,
            interval,
            scan_on_start,
            control: None,
            handle: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_scan_on_start(mut self, scan_on_start: bool) -> Self {
        self.scan_on_start = scan_on_start;
        self
    }

    pub fn service(&self) -> &Arc<ScanService> {
        &self.service
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Close runs a dead scanner left `running`, then spawn the scheduler thread.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(VidshelfError::Other("Scheduler already started".to_string()));
        }

        let interrupted = interrupt_abandoned_runs(self.service.catalog())?;
        if interrupted > 0 {
            log::warn!("Marked {} abandoned scan runs as failed", interrupted);
        }

        let (tx, rx) = mpsc::channel();
        let service = Arc::clone(&self.service);
        let interval = self.interval;
        let scan_on_start = self.scan_on_start;

        let handle = std::thread::Builder::new()
            .name("scan-scheduler".into())
            .spawn(move || scheduler_loop(service, rx, interval, scan_on_start))?;

        log::info!("Scan scheduler started (interval {}s)", interval.as_secs());
        self.control = Some(tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Run a scan now on the calling thread.
    pub fn trigger_scan(&self) -> Result<ScanRun> {
        self.service.scan(ScanTrigger::Manual)
    }

    /// Cancel the active run (if any), stop the thread and wait for it.
    pub fn stop(&mut self) {
        if let Some(tx) = self.control.take() {
            self.service.request_cancel();
            let _ = tx.send(Control::Stop);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Scan scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn scheduler_loop(
    service: Arc<ScanService>,
    rx: mpsc::Receiver<Control>,
    interval: Duration,
    scan_on_start: bool,
) {
    if scan_on_start && !stop_requested(&rx) {
        run_tick(&service, ScanTrigger::Startup);
    }

    loop {
        match rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                run_tick(&service, ScanTrigger::Periodic);
                if let Err(e) = service.prune_scan_history(SCAN_HISTORY_RETENTION_DAYS) {
                    log::error!("Scan history cleanup failed: {}", e);
                }
            }
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("Scan scheduler stopped");
}

fn stop_requested(rx: &mpsc::Receiver<Control>) -> bool {
    match rx.try_recv() {
        Ok(Control::Stop) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

/// One scheduled scan. Panics are caught so the thread never dies.
fn run_tick(service: &ScanService, trigger: ScanTrigger) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| service.scan(trigger)));

    match result {
        Ok(Ok(run)) => {
            log::debug!("Scheduled {} scan finished as {}", trigger.as_str(), run.status);
        }
        Ok(Err(VidshelfError::ScanInProgress)) => {
            log::info!("Skipping {} scan: another scan is running", trigger.as_str());
        }
        Ok(Err(e)) => {
            log::error!("Scheduled {} scan failed: {}", trigger.as_str(), e);
        }
        Err(_) => {
            log::error!("Scheduled {} scan panicked (recovered)", trigger.as_str());
        }
    }
}
