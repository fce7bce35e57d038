// Duplicate detection over (byte_size, content_fingerprint)
//
// The pass recomputes the flag for every record from the current catalog
// state, so running it twice with no changes in between is a no-op.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::schema::{self, MediaRecord};
use crate::db::Catalog;
use crate::error::Result;

/// Recompute `duplicate` for every record. Returns the number flagged.
pub fn refresh_duplicate_flags(conn: &Connection) -> Result<i64> {
    // Clear records that no longer share their key
    conn.execute(
        "UPDATE media SET duplicate = 0, updated_at = datetime('now')
         WHERE duplicate = 1
           AND NOT EXISTS (
               SELECT 1 FROM media o
               WHERE o.byte_size = media.byte_size
                 AND o.content_fingerprint = media.content_fingerprint
                 AND o.id != media.id
           )",
        [],
    )?;

    // Flag every member of each group, the oldest included
    conn.execute(
        "UPDATE media SET duplicate = 1, updated_at = datetime('now')
         WHERE duplicate = 0
           AND EXISTS (
               SELECT 1 FROM media o
               WHERE o.byte_size = media.byte_size
                 AND o.content_fingerprint = media.content_fingerprint
                 AND o.id != media.id
           )",
        [],
    )?;

    let flagged = conn.query_row("SELECT COUNT(*) FROM media WHERE duplicate = 1", [], |row| {
        row.get(0)
    })?;
    Ok(flagged)
}

/// Run the detector in its own transaction.
pub fn detect_duplicates(catalog: &Catalog) -> Result<i64> {
    let flagged = catalog.with_transaction(refresh_duplicate_flags)?;
    log::info!("Duplicate pass flagged {} records", flagged);
    Ok(flagged)
}

/// Records sharing one (byte_size, content_fingerprint) key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub byte_size: i64,
    pub content_fingerprint: String,
    /// Oldest record of the group; the one a cleanup would keep.
    pub keeper_id: i64,
    pub members: Vec<MediaRecord>,
}

pub fn duplicate_groups(conn: &Connection) -> Result<Vec<DuplicateGroup>> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();

    for record in schema::list_duplicate_members(conn)? {
        match groups.last_mut() {
            Some(group)
                if group.byte_size == record.byte_size
                    && group.content_fingerprint == record.content_fingerprint =>
            {
                group.members.push(record);
            }
            _ => groups.push(DuplicateGroup {
                byte_size: record.byte_size,
                content_fingerprint: record.content_fingerprint.clone(),
                keeper_id: record.id,
                members: vec![record],
            }),
        }
    }

    Ok(groups)
}
