// Database schema types and query helpers

use std::fmt;
use std::str::FromStr;
use rusqlite::{Connection, Row, params, OptionalExtension};
use serde::{Deserialize, Serialize};
use crate::error::{VidshelfError, Result};
use crate::metadata::MediaInfo;

// ----- MediaRecord -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub id: i64,
    pub identity: String,
    pub display_name: String,
    pub relative_path: String,
    pub byte_size: i64,
    pub content_fingerprint: String,
    pub media_info: Option<MediaInfo>,
    pub deleted: bool,
    pub duplicate: bool,
    pub thumbnail_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_accessed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMedia {
    pub identity: String,
    pub display_name: String,
    pub relative_path: String,
    pub byte_size: i64,
    pub content_fingerprint: String,
    pub media_info: Option<MediaInfo>,
}

const MEDIA_COLUMNS: &str =
    "id, identity, display_name, relative_path, byte_size, content_fingerprint,
     duration_secs, width, height, fps, codec, bitrate,
     deleted, duplicate, thumbnail_path, created_at, updated_at, last_accessed_at";

fn media_from_row(row: &Row<'_>) -> rusqlite::Result<MediaRecord> {
    let info = MediaInfo {
        duration_secs: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        fps: row.get(9)?,
        codec: row.get(10)?,
        bitrate: row.get(11)?,
    };

    Ok(MediaRecord {
        id: row.get(0)?,
        identity: row.get(1)?,
        display_name: row.get(2)?,
        relative_path: row.get(3)?,
        byte_size: row.get(4)?,
        content_fingerprint: row.get(5)?,
        media_info: if info.is_empty() { None } else { Some(info) },
        deleted: row.get(12)?,
        duplicate: row.get(13)?,
        thumbnail_path: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
        last_accessed_at: row.get(17)?,
    })
}

/// Insert a new record. `duplicate` always starts false; the detector pass owns it.
pub fn insert_media(conn: &Connection, media: &NewMedia) -> Result<i64> {
    let info = media.media_info.clone().unwrap_or_default();
    conn.execute(
        "INSERT INTO media (identity, display_name, relative_path, byte_size, content_fingerprint,
                            duration_secs, width, height, fps, codec, bitrate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            media.identity,
            media.display_name,
            media.relative_path,
            media.byte_size,
            media.content_fingerprint,
            info.duration_secs,
            info.width,
            info.height,
            info.fps,
            info.codec,
            info.bitrate,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_media(conn: &Connection, id: i64) -> Result<Option<MediaRecord>> {
    let sql = format!("SELECT {} FROM media WHERE id = ?1", MEDIA_COLUMNS);
    let result = conn.query_row(&sql, params![id], media_from_row).optional()?;
    Ok(result)
}

pub fn get_media_by_identity(conn: &Connection, identity: &str) -> Result<Option<MediaRecord>> {
    let sql = format!("SELECT {} FROM media WHERE identity = ?1", MEDIA_COLUMNS);
    let result = conn.query_row(&sql, params![identity], media_from_row).optional()?;
    Ok(result)
}

/// Move-detection candidates, oldest first.
pub fn find_media_by_name_and_size(
    conn: &Connection,
    display_name: &str,
    byte_size: i64,
) -> Result<Vec<MediaRecord>> {
    let sql = format!(
        "SELECT {} FROM media WHERE display_name = ?1 AND byte_size = ?2 ORDER BY created_at, id",
        MEDIA_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params![display_name, byte_size], media_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Record a size change observed at the same path.
pub fn update_media_content(
    conn: &Connection,
    id: i64,
    byte_size: i64,
    content_fingerprint: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE media SET byte_size = ?1, content_fingerprint = ?2, updated_at = datetime('now')
         WHERE id = ?3",
        params![byte_size, content_fingerprint, id],
    )?;
    Ok(())
}

/// Re-home a record after move detection; identity follows the new path.
pub fn update_media_location(
    conn: &Connection,
    id: i64,
    identity: &str,
    relative_path: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE media SET identity = ?1, relative_path = ?2, updated_at = datetime('now')
         WHERE id = ?3",
        params![identity, relative_path, id],
    )?;
    Ok(())
}

pub fn set_thumbnail_path(conn: &Connection, identity: &str, thumbnail_path: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE media SET thumbnail_path = ?1, updated_at = datetime('now') WHERE identity = ?2",
        params![thumbnail_path, identity],
    )?;
    Ok(rows > 0)
}

pub fn set_media_deleted(conn: &Connection, id: i64, deleted: bool) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE media SET deleted = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![deleted, id],
    )?;
    Ok(rows > 0)
}

pub fn touch_media_access(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE media SET last_accessed_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    Ok(rows > 0)
}

/// Read-side filter for collaborators. `None` means "don't care".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFilter {
    pub deleted: Option<bool>,
    pub duplicate: Option<bool>,
    pub missing_thumbnail: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl MediaFilter {
    pub fn active() -> Self {
        Self {
            deleted: Some(false),
            ..Self::default()
        }
    }
}

fn filter_clause(filter: &MediaFilter) -> String {
    let mut clauses: Vec<&str> = Vec::new();
    if let Some(deleted) = filter.deleted {
        clauses.push(if deleted { "deleted = 1" } else { "deleted = 0" });
    }
    if let Some(duplicate) = filter.duplicate {
        clauses.push(if duplicate { "duplicate = 1" } else { "duplicate = 0" });
    }
    if filter.missing_thumbnail {
        clauses.push("thumbnail_path IS NULL");
    }

    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

/// Newest first. `limit`/`offset` page through the filtered set.
pub fn list_media(conn: &Connection, filter: &MediaFilter) -> Result<Vec<MediaRecord>> {
    let sql = format!(
        "SELECT {} FROM media {} ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        MEDIA_COLUMNS,
        filter_clause(filter)
    );

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(
            params![filter.limit.unwrap_or(-1), filter.offset.unwrap_or(0)],
            media_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Size of the filtered set, ignoring `limit`/`offset`.
pub fn count_media(conn: &Connection, filter: &MediaFilter) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM media {}", filter_clause(filter));
    let count = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count)
}

/// All records sharing a (size, fingerprint) key with at least one other record,
/// ordered so members of the same group are adjacent and the oldest comes first.
pub fn list_duplicate_members(conn: &Connection) -> Result<Vec<MediaRecord>> {
    let sql = format!(
        "SELECT {} FROM media m
         WHERE EXISTS (
             SELECT 1 FROM media o
             WHERE o.byte_size = m.byte_size
               AND o.content_fingerprint = m.content_fingerprint
               AND o.id != m.id
         )
         ORDER BY byte_size, content_fingerprint, created_at, id",
        MEDIA_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([], media_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

// ----- Tags -----

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub usage_count: i64,
}

pub fn get_or_create_tag(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
    let id = conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| row.get(0))?;
    Ok(id)
}

pub fn get_tag_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| row.get(0))
        .optional()?;
    Ok(id)
}

/// Attach a tag; returns false if it was already attached.
pub fn add_media_tag(conn: &Connection, media_id: i64, tag_id: i64) -> Result<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO media_tags (media_id, tag_id) VALUES (?1, ?2)",
        params![media_id, tag_id],
    )?;
    if rows > 0 {
        conn.execute(
            "UPDATE tags SET usage_count = usage_count + 1 WHERE id = ?1",
            params![tag_id],
        )?;
    }
    Ok(rows > 0)
}

/// Detach a tag; returns false if it was not attached.
pub fn remove_media_tag(conn: &Connection, media_id: i64, tag_id: i64) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM media_tags WHERE media_id = ?1 AND tag_id = ?2",
        params![media_id, tag_id],
    )?;
    if rows > 0 {
        conn.execute(
            "UPDATE tags SET usage_count = MAX(usage_count - 1, 0) WHERE id = ?1",
            params![tag_id],
        )?;
    }
    Ok(rows > 0)
}

pub fn list_media_tags(conn: &Connection, media_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t
         JOIN media_tags mt ON mt.tag_id = t.id
         WHERE mt.media_id = ?1
         ORDER BY t.name",
    )?;
    let names = stmt
        .query_map(params![media_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(names)
}

pub fn list_tags(conn: &Connection) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, usage_count FROM tags ORDER BY usage_count DESC, name",
    )?;
    let tags = stmt
        .query_map([], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                usage_count: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

// ----- ScanRun -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanStatus::Running)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = VidshelfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            "cancelled" => Ok(ScanStatus::Cancelled),
            other => Err(VidshelfError::Other(format!("Unknown scan status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanTrigger {
    Startup,
    Periodic,
    Manual,
}

impl ScanTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanTrigger::Startup => "startup",
            ScanTrigger::Periodic => "periodic",
            ScanTrigger::Manual => "manual",
        }
    }
}

impl FromStr for ScanTrigger {
    type Err = VidshelfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "startup" => Ok(ScanTrigger::Startup),
            "periodic" => Ok(ScanTrigger::Periodic),
            "manual" => Ok(ScanTrigger::Manual),
            other => Err(VidshelfError::Other(format!("Unknown scan trigger: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCounters {
    pub scanned: i64,
    pub added: i64,
    pub updated: i64,
    pub duplicates_found: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRun {
    pub id: i64,
    pub run_token: String,
    pub host: Option<String>,
    pub trigger: ScanTrigger,
    pub status: ScanStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    #[serde(flatten)]
    pub counters: ScanCounters,
    pub errors: Vec<String>,
    /// Last checkpoint of a running run.
    pub heartbeat_at: String,
}

impl ScanRun {
    /// Wall-clock length of a finished run, from SQLite `datetime('now')` stamps.
    pub fn elapsed_secs(&self) -> Option<i64> {
        let parse = |s: &str| chrono::NaiveDateTime::parse_from_str(s, SQLITE_DATETIME_FORMAT).ok();
        let started = parse(&self.started_at)?;
        let completed = parse(self.completed_at.as_deref()?)?;
        Some((completed - started).num_seconds().max(0))
    }

    /// Seconds since the run last checkpointed.
    pub fn heartbeat_age_secs(&self) -> Option<i64> {
        let heartbeat = chrono::NaiveDateTime::parse_from_str(&self.heartbeat_at, SQLITE_DATETIME_FORMAT).ok()?;
        Some((chrono::Utc::now().naive_utc() - heartbeat).num_seconds())
    }
}

const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCAN_RUN_COLUMNS: &str =
    "id, run_token, host, trigger, status, started_at, completed_at,
     scanned, added, updated, duplicates_found, errors, heartbeat_at";

fn scan_run_from_row(row: &Row<'_>) -> rusqlite::Result<ScanRun> {
    let trigger: String = row.get(3)?;
    let status: String = row.get(4)?;
    let errors: String = row.get(11)?;

    Ok(ScanRun {
        id: row.get(0)?,
        run_token: row.get(1)?,
        host: row.get(2)?,
        trigger: trigger.parse().map_err(|e| conversion_error(3, e))?,
        status: status.parse().map_err(|e| conversion_error(4, e))?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        counters: ScanCounters {
            scanned: row.get(7)?,
            added: row.get(8)?,
            updated: row.get(9)?,
            duplicates_found: row.get(10)?,
        },
        errors: serde_json::from_str(&errors).map_err(|e| conversion_error(11, e))?,
        heartbeat_at: row.get(12)?,
    })
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

pub fn insert_scan_run(
    conn: &Connection,
    run_token: &str,
    host: Option<&str>,
    trigger: ScanTrigger,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO scan_runs (run_token, host, trigger, status) VALUES (?1, ?2, ?3, 'running')",
        params![run_token, host, trigger.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Persist counters and errors of a run that is still running.
pub fn update_scan_run_progress(
    conn: &Connection,
    id: i64,
    run_token: &str,
    counters: &ScanCounters,
    errors: &[String],
) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE scan_runs
         SET scanned = ?1, added = ?2, updated = ?3, duplicates_found = ?4, errors = ?5,
             heartbeat_at = datetime('now')
         WHERE id = ?6 AND run_token = ?7 AND status = 'running'",
        params![
            counters.scanned,
            counters.added,
            counters.updated,
            counters.duplicates_found,
            serde_json::to_string(errors)?,
            id,
            run_token,
        ],
    )?;
    Ok(rows > 0)
}

/// Move a running run to a terminal status. Returns false if it was already finalized.
pub fn finish_scan_run(
    conn: &Connection,
    id: i64,
    run_token: &str,
    status: ScanStatus,
    counters: &ScanCounters,
    errors: &[String],
) -> Result<bool> {
    if !status.is_terminal() {
        return Err(VidshelfError::Other("Cannot finish a scan run as running".to_string()));
    }

    let rows = conn.execute(
        "UPDATE scan_runs
         SET status = ?1, completed_at = datetime('now'),
             scanned = ?2, added = ?3, updated = ?4, duplicates_found = ?5, errors = ?6
         WHERE id = ?7 AND run_token = ?8 AND status = 'running'",
        params![
            status.as_str(),
            counters.scanned,
            counters.added,
            counters.updated,
            counters.duplicates_found,
            serde_json::to_string(errors)?,
            id,
            run_token,
        ],
    )?;
    Ok(rows > 0)
}

pub fn get_scan_run(conn: &Connection, id: i64) -> Result<Option<ScanRun>> {
    let sql = format!("SELECT {} FROM scan_runs WHERE id = ?1", SCAN_RUN_COLUMNS);
    let result = conn.query_row(&sql, params![id], scan_run_from_row).optional()?;
    Ok(result)
}

pub fn latest_scan_run(conn: &Connection) -> Result<Option<ScanRun>> {
    let sql = format!("SELECT {} FROM scan_runs ORDER BY id DESC LIMIT 1", SCAN_RUN_COLUMNS);
    let result = conn.query_row(&sql, [], scan_run_from_row).optional()?;
    Ok(result)
}

pub fn list_scan_runs(conn: &Connection, limit: i64) -> Result<Vec<ScanRun>> {
    let sql = format!("SELECT {} FROM scan_runs ORDER BY id DESC LIMIT ?1", SCAN_RUN_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let runs = stmt
        .query_map(params![limit], scan_run_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(runs)
}

/// Delete finished runs that started more than `days` days ago.
pub fn delete_scan_runs_older_than(conn: &Connection, days: i64) -> Result<usize> {
    let rows = conn.execute(
        "DELETE FROM scan_runs
         WHERE status != 'running' AND started_at < datetime('now', ?1)",
        params![format!("-{} days", days)],
    )?;
    Ok(rows)
}

pub fn list_running_scan_runs(conn: &Connection) -> Result<Vec<ScanRun>> {
    let sql = format!("SELECT {} FROM scan_runs WHERE status = 'running'", SCAN_RUN_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let runs = stmt
        .query_map([], scan_run_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(runs)
}

/// Close a run whose scanner is gone. Returns false if it had already finished.
pub fn interrupt_scan_run(conn: &Connection, id: i64, run_token: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE scan_runs
         SET status = 'failed', completed_at = datetime('now'),
             errors = json_insert(errors, '$[#]', 'Scan interrupted before completion')
         WHERE id = ?1 AND run_token = ?2 AND status = 'running'",
        params![id, run_token],
    )?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        crate::db::migrations::run_migrations(&conn).unwrap();
        conn
    }

    fn new_media(path: &str, size: i64, fingerprint: &str) -> NewMedia {
        NewMedia {
            identity: crate::hash::compute_identity(path),
            display_name: path.rsplit('/').next().unwrap().to_string(),
            relative_path: path.to_string(),
            byte_size: size,
            content_fingerprint: fingerprint.to_string(),
            media_info: None,
        }
    }

    #[test]
    fn test_insert_and_lookup_media() {
        let conn = setup();
        let id = insert_media(&conn, &new_media("videos/a.mp4", 10, "fp")).unwrap();

        let by_id = get_media(&conn, id).unwrap().unwrap();
        let by_identity = get_media_by_identity(&conn, &by_id.identity).unwrap().unwrap();
        assert_eq!(by_id, by_identity);
        assert!(!by_id.duplicate);
        assert!(!by_id.deleted);
        assert!(by_id.media_info.is_none());
        assert!(by_id.thumbnail_path.is_none());
    }

    #[test]
    fn test_identity_is_unique() {
        let conn = setup();
        insert_media(&conn, &new_media("videos/a.mp4", 10, "fp")).unwrap();
        assert!(insert_media(&conn, &new_media("videos/a.mp4", 20, "other")).is_err());
    }

    #[test]
    fn test_media_info_round_trips() {
        let conn = setup();
        let mut media = new_media("videos/a.mp4", 10, "fp");
        media.media_info = Some(MediaInfo {
            duration_secs: Some(3.5),
            width: Some(640),
            height: Some(480),
            fps: Some(25.0),
            codec: Some("h264".to_string()),
            bitrate: Some(1000),
        });
        let id = insert_media(&conn, &media).unwrap();
        let stored = get_media(&conn, id).unwrap().unwrap();
        assert_eq!(stored.media_info, media.media_info);
    }

    #[test]
    fn test_list_media_filters() {
        let conn = setup();
        let a = insert_media(&conn, &new_media("a.mp4", 1, "x")).unwrap();
        let b = insert_media(&conn, &new_media("b.mp4", 2, "y")).unwrap();
        set_media_deleted(&conn, a, true).unwrap();
        set_thumbnail_path(&conn, &crate::hash::compute_identity("b.mp4"), "thumbs/b.webp").unwrap();

        let deleted = list_media(&conn, &MediaFilter { deleted: Some(true), ..Default::default() }).unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, a);

        let missing = list_media(&conn, &MediaFilter { missing_thumbnail: true, ..Default::default() }).unwrap();
        assert_eq!(missing.iter().map(|m| m.id).collect::<Vec<_>>(), vec![a]);

        let active = list_media(&conn, &MediaFilter::active()).unwrap();
        assert_eq!(active.iter().map(|m| m.id).collect::<Vec<_>>(), vec![b]);

        let limited = list_media(&conn, &MediaFilter { limit: Some(1), ..Default::default() }).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(count_media(&conn, &MediaFilter { limit: Some(1), ..Default::default() }).unwrap(), 2);
        assert_eq!(count_media(&conn, &MediaFilter::active()).unwrap(), 1);
    }

    #[test]
    fn test_tag_usage_counts() {
        let conn = setup();
        let id = insert_media(&conn, &new_media("a.mp4", 1, "x")).unwrap();
        let tag = get_or_create_tag(&conn, "family").unwrap();
        assert_eq!(get_or_create_tag(&conn, "family").unwrap(), tag);

        assert!(add_media_tag(&conn, id, tag).unwrap());
        assert!(!add_media_tag(&conn, id, tag).unwrap());
        assert_eq!(list_media_tags(&conn, id).unwrap(), vec!["family".to_string()]);
        assert_eq!(list_tags(&conn).unwrap()[0].usage_count, 1);

        assert!(remove_media_tag(&conn, id, tag).unwrap());
        assert!(!remove_media_tag(&conn, id, tag).unwrap());
        assert_eq!(list_tags(&conn).unwrap()[0].usage_count, 0);
    }

    #[test]
    fn test_scan_run_finalizes_once() {
        let conn = setup();
        let id = insert_scan_run(&conn, "token", Some("host:1"), ScanTrigger::Manual).unwrap();
        let counters = ScanCounters { scanned: 3, added: 2, updated: 1, duplicates_found: 0 };
        let errors = vec!["bad file".to_string()];

        assert!(update_scan_run_progress(&conn, id, "token", &counters, &errors).unwrap());
        assert!(!finish_scan_run(&conn, id, "wrong", ScanStatus::Completed, &counters, &errors).unwrap());
        assert!(finish_scan_run(&conn, id, "token", ScanStatus::Completed, &counters, &errors).unwrap());
        assert!(!finish_scan_run(&conn, id, "token", ScanStatus::Failed, &counters, &errors).unwrap());

        let run = get_scan_run(&conn, id).unwrap().unwrap();
        assert_eq!(run.status, ScanStatus::Completed);
        assert_eq!(run.counters, counters);
        assert_eq!(run.errors, errors);
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_elapsed_secs() {
        let conn = setup();
        let id = insert_scan_run(&conn, "tok", None, ScanTrigger::Manual).unwrap();
        assert_eq!(get_scan_run(&conn, id).unwrap().unwrap().elapsed_secs(), None);

        conn.execute(
            "UPDATE scan_runs SET started_at = '2024-05-01 10:00:00', completed_at = '2024-05-01 10:02:05',
                                  status = 'completed' WHERE id = ?1",
            params![id],
        )
        .unwrap();
        assert_eq!(get_scan_run(&conn, id).unwrap().unwrap().elapsed_secs(), Some(125));
    }

    #[test]
    fn test_interrupt_scan_run() {
        let conn = setup();
        let id = insert_scan_run(&conn, "t", None, ScanTrigger::Periodic).unwrap();
        assert_eq!(list_running_scan_runs(&conn).unwrap().len(), 1);
        assert!(!interrupt_scan_run(&conn, id, "other").unwrap());
        assert!(interrupt_scan_run(&conn, id, "t").unwrap());
        assert!(!interrupt_scan_run(&conn, id, "t").unwrap());

        let run = get_scan_run(&conn, id).unwrap().unwrap();
        assert_eq!(run.status, ScanStatus::Failed);
        assert_eq!(run.errors, vec!["Scan interrupted before completion".to_string()]);
        assert!(list_running_scan_runs(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_only_one_run_may_be_running() {
        let conn = setup();
        let first = insert_scan_run(&conn, "a", None, ScanTrigger::Periodic).unwrap();

        let err = insert_scan_run(&conn, "b", None, ScanTrigger::Manual).unwrap_err();
        match err {
            VidshelfError::Database(e) => {
                assert_eq!(e.sqlite_error_code(), Some(rusqlite::ErrorCode::ConstraintViolation))
            }
            other => panic!("expected a constraint violation, got {:?}", other),
        }

        finish_scan_run(&conn, first, "a", ScanStatus::Completed, &ScanCounters::default(), &[]).unwrap();
        assert!(insert_scan_run(&conn, "b", None, ScanTrigger::Manual).is_ok());
    }

    #[test]
    fn test_checkpoint_refreshes_heartbeat() {
        let conn = setup();
        let id = insert_scan_run(&conn, "t", None, ScanTrigger::Manual).unwrap();
        conn.execute(
            "UPDATE scan_runs SET heartbeat_at = datetime('now', '-2 hours') WHERE id = ?1",
            params![id],
        )
        .unwrap();
        let age = get_scan_run(&conn, id).unwrap().unwrap().heartbeat_age_secs().unwrap();
        assert!(age >= 7200);

        update_scan_run_progress(&conn, id, "t", &ScanCounters::default(), &[]).unwrap();
        let age = get_scan_run(&conn, id).unwrap().unwrap().heartbeat_age_secs().unwrap();
        assert!(age < 60);
    }

    #[test]
    fn test_delete_old_scan_runs_keeps_recent_and_running() {
        let conn = setup();
        let old = insert_scan_run(&conn, "a", None, ScanTrigger::Periodic).unwrap();
        finish_scan_run(&conn, old, "a", ScanStatus::Completed, &ScanCounters::default(), &[]).unwrap();
        let recent = insert_scan_run(&conn, "c", None, ScanTrigger::Manual).unwrap();
        finish_scan_run(&conn, recent, "c", ScanStatus::Completed, &ScanCounters::default(), &[]).unwrap();
        let running = insert_scan_run(&conn, "b", None, ScanTrigger::Periodic).unwrap();
        conn.execute(
            "UPDATE scan_runs SET started_at = datetime('now', '-40 days') WHERE id IN (?1, ?2)",
            params![old, running],
        ).unwrap();

        assert_eq!(delete_scan_runs_older_than(&conn, 30).unwrap(), 1);
        assert!(get_scan_run(&conn, old).unwrap().is_none());
        assert!(get_scan_run(&conn, running).unwrap().is_some());
        assert!(get_scan_run(&conn, recent).unwrap().is_some());
    }
}
