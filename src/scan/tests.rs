// --- Scan run scenario tests ---

use super::reconcile::NameAndSize;
use super::*;
use crate::db::schema::{MediaFilter, MediaRecord, ScanStatus};
use crate::metadata::MediaInfo;
use crate::preview::thumb::PreviewOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tempfile::TempDir;

/// Transcoder stand-in. Renders write a small placeholder file.
#[derive(Default)]
struct FakeTranscoder {
    fail_render: bool,
    /// Fail only renders whose source file name contains this.
    fail_render_for: Option<&'static str>,
    /// Raised on the first probe, to cancel a run mid-walk.
    cancel_on_probe: Option<Arc<AtomicBool>>,
    probes: AtomicUsize,
    renders: AtomicUsize,
}

impl Transcoder for FakeTranscoder {
    fn probe(&self, _source: &Path) -> Result<MediaInfo> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(flag) = &self.cancel_on_probe {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(MediaInfo {
            duration_secs: Some(4.0),
            codec: Some("h264".to_string()),
            ..MediaInfo::default()
        })
    }

    fn render_preview(
        &self,
        source: &Path,
        output: &Path,
        _options: &PreviewOptions,
        _source_duration: Option<f64>,
    ) -> Result<()> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        let name = source.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        if self.fail_render || self.fail_render_for.map(|f| name.contains(f)).unwrap_or(false) {
            return Err(VidshelfError::FFmpeg("encoder exploded".to_string()));
        }
        std::fs::write(output, b"RIFF....WEBP")?;
        Ok(())
    }
}

/// Media root in a temp dir with an empty `videos/` folder.
fn setup() -> (TempDir, ScanConfig, Catalog) {
    let tmp = TempDir::new().unwrap();
    let mut config = ScanConfig::for_media_root(tmp.path());
    config.fingerprint_budget_bytes = 4096;
    std::fs::create_dir_all(config.watched_root()).unwrap();
    let catalog = Catalog::open_in_memory().unwrap();
    (tmp, config, catalog)
}

fn put(config: &ScanConfig, rel: &str, content: &[u8]) -> PathBuf {
    let path = config.watched_root().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

fn scan_with(
    catalog: &Catalog,
    transcoder: &FakeTranscoder,
    config: &ScanConfig,
    cancel: Option<&AtomicBool>,
) -> ScanRun {
    let ctx = ScanContext {
        catalog,
        transcoder,
        move_policy: &NameAndSize,
        config,
        cancel,
    };
    run_scan(&ctx, ScanTrigger::Manual).unwrap()
}

fn scan(catalog: &Catalog, transcoder: &FakeTranscoder, config: &ScanConfig) -> ScanRun {
    scan_with(catalog, transcoder, config, None)
}

fn all_media(catalog: &Catalog) -> Vec<MediaRecord> {
    catalog
        .with_conn(|conn| schema::list_media(conn, &MediaFilter::default()))
        .unwrap()
}

fn media_at(catalog: &Catalog, rel: &str) -> MediaRecord {
    all_media(catalog)
        .into_iter()
        .find(|m| m.relative_path == rel)
        .unwrap()
}

/// Stored thumbnail path for a file first added at `rel`.
fn thumb_path(rel: &str) -> String {
    let name = rel.rsplit('/').next().unwrap();
    format!("thumbs/{}", crate::preview::thumbnail_file_name(name, &crate::hash::compute_identity(rel)))
}

// ---------------------------------------------------------------
// Idempotence: a second scan over an unchanged tree changes nothing
// ---------------------------------------------------------------
#[test]
fn test_rescan_of_unchanged_tree_is_a_no_op() {
    let (_tmp, config, catalog) = setup();
    let fake = FakeTranscoder::default();
    put(&config, "a.mp4", b"first video");
    put(&config, "trip/b.mkv", b"second video");

    let first = scan(&catalog, &fake, &config);
    assert_eq!(first.status, ScanStatus::Completed);
    assert_eq!(first.counters.scanned, 2);
    assert_eq!(first.counters.added, 2);
    assert!(first.errors.is_empty(), "unexpected errors: {:?}", first.errors);
    let before = all_media(&catalog);

    let second = scan(&catalog, &fake, &config);
    assert_eq!(second.status, ScanStatus::Completed);
    assert_eq!(second.counters.scanned, 2);
    assert_eq!(second.counters.added, 0);
    assert_eq!(second.counters.updated, 0);
    assert_eq!(all_media(&catalog), before, "catalog must be untouched by a no-op rescan");
    assert_eq!(fake.renders.load(Ordering::SeqCst), 2, "no new previews on rescan");
}

// ---------------------------------------------------------------
// Move detection: same name and size at a new path keeps the record
// ---------------------------------------------------------------
#[test]
fn test_moved_file_keeps_its_record() {
    let (_tmp, config, catalog) = setup();
    let fake = FakeTranscoder::default();
    let old_path = put(&config, "inbox/clip.mp4", b"clip bytes");

    scan(&catalog, &fake, &config);
    let original = all_media(&catalog).pop().unwrap();
    assert_eq!(original.thumbnail_path, Some(thumb_path("inbox/clip.mp4")));

    // Tag it so we can tell the record survived
    catalog
        .with_conn(|conn| {
            let tag = schema::get_or_create_tag(conn, "keep")?;
            schema::add_media_tag(conn, original.id, tag)
        })
        .unwrap();

    let new_path = config.watched_root().join("archive/2024/clip.mp4");
    std::fs::create_dir_all(new_path.parent().unwrap()).unwrap();
    std::fs::rename(&old_path, &new_path).unwrap();

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.counters.scanned, 1);
    assert_eq!(run.counters.added, 0);
    assert_eq!(run.counters.updated, 1);

    let records = all_media(&catalog);
    assert_eq!(records.len(), 1);
    let moved = &records[0];
    assert_eq!(moved.id, original.id);
    assert_eq!(moved.relative_path, "archive/2024/clip.mp4");
    assert_eq!(moved.identity, crate::hash::compute_identity("archive/2024/clip.mp4"));
    assert_eq!(moved.thumbnail_path, original.thumbnail_path);
    let tags = catalog.with_conn(|conn| schema::list_media_tags(conn, moved.id)).unwrap();
    assert_eq!(tags, vec!["keep".to_string()]);
}

// ---------------------------------------------------------------
// Duplicates: identical content at two paths flags both
// ---------------------------------------------------------------
#[test]
fn test_identical_files_are_both_flagged() {
    let (_tmp, config, catalog) = setup();
    let fake = FakeTranscoder::default();
    put(&config, "a.mp4", b"same content");
    put(&config, "b.mp4", b"same content");
    put(&config, "c.mp4", b"other content");

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.counters.scanned, 3);
    assert_eq!(run.counters.added, 3);
    assert_eq!(run.counters.duplicates_found, 2);

    let flagged: Vec<String> = all_media(&catalog)
        .into_iter()
        .filter(|m| m.duplicate)
        .map(|m| m.relative_path)
        .collect();
    assert_eq!(flagged.len(), 2);
    assert!(flagged.contains(&"a.mp4".to_string()));
    assert!(flagged.contains(&"b.mp4".to_string()));
}

// ---------------------------------------------------------------
// Size change at the same path: updated in place, new fingerprint
// ---------------------------------------------------------------
#[test]
fn test_resized_file_is_updated_in_place() {
    let (_tmp, config, catalog) = setup();
    let fake = FakeTranscoder::default();
    put(&config, "grow.mp4", b"short");

    scan(&catalog, &fake, &config);
    let before = all_media(&catalog).pop().unwrap();

    put(&config, "grow.mp4", b"a good deal longer now");
    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.counters.added, 0);
    assert_eq!(run.counters.updated, 1);

    let after = all_media(&catalog).pop().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.byte_size, 22);
    assert_ne!(after.content_fingerprint, before.content_fingerprint);
}

// ---------------------------------------------------------------
// Partial failure: one bad entry does not stop the others
// ---------------------------------------------------------------
#[cfg(unix)]
#[test]
fn test_bad_entry_is_isolated() {
    let (_tmp, config, catalog) = setup();
    let fake = FakeTranscoder::default();
    put(&config, "a.mp4", b"one");
    put(&config, "c.mp4", b"three");
    std::os::unix::fs::symlink(
        config.watched_root().join("missing-target.mp4"),
        config.watched_root().join("b.mp4"),
    )
    .unwrap();

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.status, ScanStatus::Completed);
    assert_eq!(run.counters.added, 2);
    assert_eq!(run.errors.len(), 1, "errors: {:?}", run.errors);
    assert_eq!(all_media(&catalog).len(), 2);
}

// ---------------------------------------------------------------
// Missing watched root: the run fails without touching the catalog
// ---------------------------------------------------------------
#[test]
fn test_missing_root_fails_the_run() {
    let (tmp, mut config, catalog) = setup();
    config.watched_root = Some(tmp.path().join("not-there"));
    let fake = FakeTranscoder::default();

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.status, ScanStatus::Failed);
    assert_eq!(run.counters.scanned, 0);
    assert_eq!(run.counters.added, 0);
    assert_eq!(run.counters.updated, 0);
    assert!(!run.errors.is_empty());
    assert!(run.completed_at.is_some());
    assert!(all_media(&catalog).is_empty());
}

// ---------------------------------------------------------------
// Unusable thumbnail directory: fatal before any file is touched
// ---------------------------------------------------------------
#[test]
fn test_thumbnail_dir_that_is_a_file_fails_the_run() {
    let (tmp, config, catalog) = setup();
    std::fs::write(tmp.path().join("thumbs"), b"not a directory").unwrap();
    put(&config, "a.mp4", b"one");
    let fake = FakeTranscoder::default();

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.status, ScanStatus::Failed);
    assert_eq!(run.counters.added, 0);
    assert!(all_media(&catalog).is_empty());
}

// ---------------------------------------------------------------
// Failing transcoder: records still land, one error per preview
// ---------------------------------------------------------------
#[test]
fn test_failed_previews_do_not_fail_the_run() {
    let (_tmp, config, catalog) = setup();
    let fake = FakeTranscoder {
        fail_render: true,
        ..FakeTranscoder::default()
    };
    put(&config, "a.mp4", b"one");
    put(&config, "b.mp4", b"two");
    put(&config, "c.mp4", b"three");

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.status, ScanStatus::Completed);
    assert_eq!(run.counters.added, 3);
    assert_eq!(run.errors.len(), 3, "errors: {:?}", run.errors);

    let records = all_media(&catalog);
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|m| m.thumbnail_path.is_none()));
    assert!(records.iter().all(|m| m.media_info.is_some()));
}

// ---------------------------------------------------------------
// Thumbnails disabled: no directory, no renders
// ---------------------------------------------------------------
#[test]
fn test_thumbnails_can_be_disabled() {
    let (tmp, mut config, catalog) = setup();
    config.generate_thumbnails = false;
    config.probe_metadata = false;
    put(&config, "a.mp4", b"one");
    let fake = FakeTranscoder::default();

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.counters.added, 1);
    assert_eq!(fake.renders.load(Ordering::SeqCst), 0);
    assert_eq!(fake.probes.load(Ordering::SeqCst), 0);
    assert!(!tmp.path().join("thumbs").exists());
}

// ---------------------------------------------------------------
// Cancellation: stops between files and closes as cancelled
// ---------------------------------------------------------------
#[test]
fn test_cancel_stops_between_files() {
    let (_tmp, config, catalog) = setup();
    let cancel = Arc::new(AtomicBool::new(false));
    let fake = FakeTranscoder {
        cancel_on_probe: Some(Arc::clone(&cancel)),
        ..FakeTranscoder::default()
    };
    put(&config, "a.mp4", b"one");
    put(&config, "b.mp4", b"two");
    put(&config, "c.mp4", b"three");

    let run = scan_with(&catalog, &fake, &config, Some(&cancel));
    assert_eq!(run.status, ScanStatus::Cancelled);
    assert_eq!(run.counters.scanned, 1);
    assert_eq!(run.counters.added, 1);
    assert_eq!(fake.renders.load(Ordering::SeqCst), 0);

    let latest = catalog.with_conn(schema::latest_scan_run).unwrap().unwrap();
    assert_eq!(latest.id, run.id);
    assert_eq!(latest.status, ScanStatus::Cancelled);
}

// ---------------------------------------------------------------
// Same base name in two folders: each record gets its own preview
// ---------------------------------------------------------------
#[test]
fn test_same_named_files_get_separate_previews() {
    let (tmp, mut config, catalog) = setup();
    config.thumbnail_workers = 2;
    let fake = FakeTranscoder::default();
    put(&config, "x/clip.mp4", b"first clip");
    put(&config, "y/clip.mp4", b"the second clip");

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.status, ScanStatus::Completed);
    assert_eq!(run.counters.added, 2);
    assert!(run.errors.is_empty(), "unexpected errors: {:?}", run.errors);

    let x = media_at(&catalog, "x/clip.mp4").thumbnail_path.unwrap();
    let y = media_at(&catalog, "y/clip.mp4").thumbnail_path.unwrap();
    assert_ne!(x, y);
    assert_eq!(x, thumb_path("x/clip.mp4"));
    assert_eq!(y, thumb_path("y/clip.mp4"));
    assert!(tmp.path().join(&x).is_file());
    assert!(tmp.path().join(&y).is_file());
}

// ---------------------------------------------------------------
// One failed preview: the other files still get theirs
// ---------------------------------------------------------------
#[test]
fn test_one_failed_preview_leaves_the_others() {
    let (_tmp, config, catalog) = setup();
    let fake = FakeTranscoder {
        fail_render_for: Some("bad"),
        ..FakeTranscoder::default()
    };
    put(&config, "a.mp4", b"one");
    put(&config, "bad.mp4", b"two");
    put(&config, "c.mp4", b"three");

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.status, ScanStatus::Completed);
    assert_eq!(run.counters.added, 3);
    assert_eq!(run.errors.len(), 1, "errors: {:?}", run.errors);
    assert!(run.errors[0].contains("bad.mp4"));

    assert_eq!(media_at(&catalog, "bad.mp4").thumbnail_path, None);
    assert_eq!(media_at(&catalog, "a.mp4").thumbnail_path, Some(thumb_path("a.mp4")));
    assert_eq!(media_at(&catalog, "c.mp4").thumbnail_path, Some(thumb_path("c.mp4")));
}

// ---------------------------------------------------------------
// Read-only thumbnail directory: every preview fails, run completes
// ---------------------------------------------------------------
#[cfg(unix)]
#[test]
fn test_read_only_thumbnail_dir() {
    use std::os::unix::fs::PermissionsExt;

    let (_tmp, config, catalog) = setup();
    let thumbs = config.thumbnail_dir();
    std::fs::create_dir_all(&thumbs).unwrap();
    std::fs::set_permissions(&thumbs, std::fs::Permissions::from_mode(0o555)).unwrap();

    // Permission bits do not bind root
    let write_check = thumbs.join("write-check");
    if std::fs::write(&write_check, b"x").is_ok() {
        std::fs::remove_file(&write_check).unwrap();
        std::fs::set_permissions(&thumbs, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    put(&config, "a.mp4", b"one");
    put(&config, "b.mp4", b"two");
    let fake = FakeTranscoder::default();

    let run = scan(&catalog, &fake, &config);
    std::fs::set_permissions(&thumbs, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(run.status, ScanStatus::Completed);
    assert_eq!(run.counters.added, 2);
    assert_eq!(run.errors.len(), 2, "errors: {:?}", run.errors);
    assert!(all_media(&catalog).iter().all(|m| m.thumbnail_path.is_none()));
}

// ---------------------------------------------------------------
// Thumbnail directory outside the media root: fatal preflight error
// ---------------------------------------------------------------
#[test]
fn test_thumbnail_dir_outside_media_root_fails_the_run() {
    let (_tmp, mut config, catalog) = setup();
    let elsewhere = TempDir::new().unwrap();
    config.thumbnail_dir = Some(elsewhere.path().join("thumbs"));
    put(&config, "a.mp4", b"one");
    let fake = FakeTranscoder::default();

    let run = scan(&catalog, &fake, &config);
    assert_eq!(run.status, ScanStatus::Failed);
    assert!(run.errors[0].contains("outside the media root"));
    assert!(all_media(&catalog).is_empty());
    assert_eq!(fake.renders.load(Ordering::SeqCst), 0);
}
