// Media commands
// Listing, lookup, soft delete, tags and bulk actions for external collaborators

use std::str::FromStr;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::schema::{self, MediaFilter, MediaRecord, Tag};
use crate::db::Catalog;
use crate::error::{VidshelfError, Result};
use crate::scan::duplicates::{self, DuplicateGroup};
use super::{normalize_tag_name, validate_page};

/// A record plus its tag names.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    #[serde(flatten)]
    pub record: MediaRecord,
    pub tags: Vec<String>,
}

/// Paginated listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPage {
    pub items: Vec<MediaView>,
    pub total: i64,
    pub offset: i64,
    pub limit: Option<i64>,
}

fn to_view(conn: &Connection, record: MediaRecord) -> Result<MediaView> {
    let tags = schema::list_media_tags(conn, record.id)?;
    Ok(MediaView { record, tags })
}

fn require_media(conn: &Connection, id: i64) -> Result<MediaRecord> {
    schema::get_media(conn, id)?.ok_or(VidshelfError::MediaNotFound(id))
}

pub fn list_media(catalog: &Catalog, filter: &MediaFilter) -> Result<MediaPage> {
    validate_page(filter.limit, filter.offset)?;

    catalog.with_conn(|conn| {
        let total = schema::count_media(conn, filter)?;
        let items = schema::list_media(conn, filter)?
            .into_iter()
            .map(|record| to_view(conn, record))
            .collect::<Result<Vec<_>>>()?;
        Ok(MediaPage {
            items,
            total,
            offset: filter.offset.unwrap_or(0),
            limit: filter.limit,
        })
    })
}

pub fn get_media(catalog: &Catalog, id: i64) -> Result<MediaView> {
    catalog.with_conn(|conn| {
        let record = require_media(conn, id)?;
        to_view(conn, record)
    })
}

pub fn get_media_by_identity(catalog: &Catalog, identity: &str) -> Result<Option<MediaView>> {
    let identity = identity.trim().to_ascii_lowercase();
    if identity.len() != 64 || !identity.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(VidshelfError::Validation(format!("Malformed identity: {}", identity)));
    }

    catalog.with_conn(|conn| match schema::get_media_by_identity(conn, &identity)? {
        Some(record) => Ok(Some(to_view(conn, record)?)),
        None => Ok(None),
    })
}

/// Soft delete or restore. The scanner never clears this flag.
pub fn set_deleted(catalog: &Catalog, id: i64, deleted: bool) -> Result<MediaView> {
    catalog.with_transaction(|conn| {
        if !schema::set_media_deleted(conn, id, deleted)? {
            return Err(VidshelfError::MediaNotFound(id));
        }
        let record = require_media(conn, id)?;
        to_view(conn, record)
    })
}

/// Stamp `lastAccessedAt` (e.g. when a client plays the file).
pub fn record_access(catalog: &Catalog, id: i64) -> Result<()> {
    catalog.with_conn(|conn| {
        if !schema::touch_media_access(conn, id)? {
            return Err(VidshelfError::MediaNotFound(id));
        }
        Ok(())
    })
}

/// Attach a tag, creating it on first use. Returns false if already attached.
pub fn attach_tag(catalog: &Catalog, id: i64, name: &str) -> Result<bool> {
    let name = normalize_tag_name(name)?;
    catalog.with_transaction(|conn| {
        require_media(conn, id)?;
        let tag_id = schema::get_or_create_tag(conn, &name)?;
        schema::add_media_tag(conn, id, tag_id)
    })
}

/// Detach a tag. Returns false if it was not attached.
pub fn detach_tag(catalog: &Catalog, id: i64, name: &str) -> Result<bool> {
    let name = normalize_tag_name(name)?;
    catalog.with_transaction(|conn| {
        require_media(conn, id)?;
        match schema::get_tag_id(conn, &name)? {
            Some(tag_id) => schema::remove_media_tag(conn, id, tag_id),
            None => Ok(false),
        }
    })
}

pub fn list_tags(catalog: &Catalog) -> Result<Vec<Tag>> {
    catalog.with_conn(schema::list_tags)
}

pub fn duplicate_groups(catalog: &Catalog) -> Result<Vec<DuplicateGroup>> {
    catalog.with_conn(duplicates::duplicate_groups)
}

// ----- Bulk actions -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Delete,
    Restore,
    AddTags,
    RemoveTags,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Delete => "delete",
            BulkAction::Restore => "restore",
            BulkAction::AddTags => "add_tags",
            BulkAction::RemoveTags => "remove_tags",
        }
    }

    fn needs_tags(&self) -> bool {
        matches!(self, BulkAction::AddTags | BulkAction::RemoveTags)
    }
}

impl FromStr for BulkAction {
    type Err = VidshelfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "delete" => Ok(BulkAction::Delete),
            "restore" => Ok(BulkAction::Restore),
            "add_tags" => Ok(BulkAction::AddTags),
            "remove_tags" => Ok(BulkAction::RemoveTags),
            other => Err(VidshelfError::Validation(format!("Unknown bulk action: {}", other))),
        }
    }
}

/// Bulk request as sent by a client; the action arrives as a plain name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub action: String,
    pub ids: Vec<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub action: BulkAction,
    /// Records whose state actually changed.
    pub affected: usize,
}

/// Apply one action to many records. The whole request is validated first;
/// an unknown action, a missing id or a bad tag name changes nothing.
pub fn bulk_action(catalog: &Catalog, request: &BulkRequest) -> Result<BulkResult> {
    let action: BulkAction = request.action.parse()?;

    if request.ids.is_empty() {
        return Err(VidshelfError::Validation("No media ids given".to_string()));
    }

    let tags = request
        .tags
        .iter()
        .map(|t| normalize_tag_name(t))
        .collect::<Result<Vec<_>>>()?;
    if action.needs_tags() && tags.is_empty() {
        return Err(VidshelfError::Validation(format!(
            "Action {} needs at least one tag",
            action.as_str()
        )));
    }

    let mut ids = request.ids.clone();
    ids.sort_unstable();
    ids.dedup();

    let affected = catalog.with_transaction(|conn| {
        for &id in &ids {
            require_media(conn, id)?;
        }

        let mut affected = 0;
        for &id in &ids {
            let changed = match action {
                BulkAction::Delete | BulkAction::Restore => {
                    let target = action == BulkAction::Delete;
                    let current = require_media(conn, id)?.deleted;
                    current != target && schema::set_media_deleted(conn, id, target)?
                }
                BulkAction::AddTags => {
                    let mut changed = false;
                    for name in &tags {
                        let tag_id = schema::get_or_create_tag(conn, name)?;
                        changed |= schema::add_media_tag(conn, id, tag_id)?;
                    }
                    changed
                }
                BulkAction::RemoveTags => {
                    let mut changed = false;
                    for name in &tags {
                        if let Some(tag_id) = schema::get_tag_id(conn, name)? {
                            changed |= schema::remove_media_tag(conn, id, tag_id)?;
                        }
                    }
                    changed
                }
            };
            if changed {
                affected += 1;
            }
        }
        Ok(affected)
    })?;

    log::info!("Bulk {} on {} records: {} changed", action.as_str(), ids.len(), affected);
    Ok(BulkResult { action, affected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::NewMedia;

    fn catalog_with(paths: &[&str]) -> (Catalog, Vec<i64>) {
        let catalog = Catalog::open_in_memory().unwrap();
        let ids = catalog
            .with_conn(|conn| {
                paths
                    .iter()
                    .map(|p| {
                        schema::insert_media(
                            conn,
                            &NewMedia {
                                identity: crate::hash::compute_identity(p),
                                display_name: p.to_string(),
                                relative_path: p.to_string(),
                                byte_size: 1,
                                content_fingerprint: format!("fp-{}", p),
                                media_info: None,
                            },
                        )
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .unwrap();
        (catalog, ids)
    }

    fn request(action: &str, ids: &[i64], tags: &[&str]) -> BulkRequest {
        BulkRequest {
            action: action.to_string(),
            ids: ids.to_vec(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_soft_delete_and_restore() {
        let (catalog, ids) = catalog_with(&["a.mp4", "b.mp4"]);

        let view = set_deleted(&catalog, ids[0], true).unwrap();
        assert!(view.record.deleted);

        let page = list_media(&catalog, &MediaFilter::active()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].record.id, ids[1]);

        set_deleted(&catalog, ids[0], false).unwrap();
        assert_eq!(list_media(&catalog, &MediaFilter::active()).unwrap().total, 2);

        assert!(matches!(set_deleted(&catalog, 999, true), Err(VidshelfError::MediaNotFound(999))));
    }

    #[test]
    fn test_tags_attach_detach() {
        let (catalog, ids) = catalog_with(&["a.mp4"]);

        assert!(attach_tag(&catalog, ids[0], "  Holiday ").unwrap());
        assert!(!attach_tag(&catalog, ids[0], "holiday").unwrap());
        assert_eq!(get_media(&catalog, ids[0]).unwrap().tags, vec!["holiday".to_string()]);
        assert_eq!(list_tags(&catalog).unwrap()[0].usage_count, 1);

        assert!(detach_tag(&catalog, ids[0], "holiday").unwrap());
        assert!(!detach_tag(&catalog, ids[0], "never-made").unwrap());
        assert!(get_media(&catalog, ids[0]).unwrap().tags.is_empty());

        assert!(matches!(attach_tag(&catalog, ids[0], "   "), Err(VidshelfError::Validation(_))));
        assert!(matches!(attach_tag(&catalog, 42, "x"), Err(VidshelfError::MediaNotFound(42))));
    }

    #[test]
    fn test_bulk_rejects_unknown_action_and_ids_without_mutation() {
        let (catalog, ids) = catalog_with(&["a.mp4", "b.mp4"]);

        let unknown = bulk_action(&catalog, &request("explode", &ids, &[]));
        assert!(matches!(unknown, Err(VidshelfError::Validation(_))));

        let missing = bulk_action(&catalog, &request("delete", &[ids[0], 777], &[]));
        assert!(matches!(missing, Err(VidshelfError::MediaNotFound(777))));
        assert!(!get_media(&catalog, ids[0]).unwrap().record.deleted);

        let no_tags = bulk_action(&catalog, &request("add_tags", &ids, &[]));
        assert!(matches!(no_tags, Err(VidshelfError::Validation(_))));
    }

    #[test]
    fn test_bulk_actions_apply() {
        let (catalog, ids) = catalog_with(&["a.mp4", "b.mp4", "c.mp4"]);

        let result = bulk_action(&catalog, &request("add_tags", &ids[..2], &["trip", "2024"])).unwrap();
        assert_eq!(result, BulkResult { action: BulkAction::AddTags, affected: 2 });
        assert_eq!(get_media(&catalog, ids[1]).unwrap().tags, vec!["2024".to_string(), "trip".to_string()]);

        let result = bulk_action(&catalog, &request("delete", &[ids[0], ids[0], ids[2]], &[])).unwrap();
        assert_eq!(result.affected, 2);
        // Deleting again changes nothing
        assert_eq!(bulk_action(&catalog, &request("delete", &[ids[0]], &[])).unwrap().affected, 0);

        let result = bulk_action(&catalog, &request("remove_tags", &ids, &["trip"])).unwrap();
        assert_eq!(result.affected, 2);

        let result = bulk_action(&catalog, &request("restore", &ids, &[])).unwrap();
        assert_eq!(result.affected, 2);
        assert_eq!(list_media(&catalog, &MediaFilter::active()).unwrap().total, 3);
    }

    #[test]
    fn test_identity_lookup_validates_input() {
        let (catalog, ids) = catalog_with(&["a.mp4"]);
        let identity = crate::hash::compute_identity("a.mp4");

        let found = get_media_by_identity(&catalog, &identity.to_uppercase()).unwrap().unwrap();
        assert_eq!(found.record.id, ids[0]);
        assert!(get_media_by_identity(&catalog, &"0".repeat(64)).unwrap().is_none());
        assert!(matches!(get_media_by_identity(&catalog, "nope"), Err(VidshelfError::Validation(_))));
    }

    #[test]
    fn test_record_access() {
        let (catalog, ids) = catalog_with(&["a.mp4"]);
        assert!(get_media(&catalog, ids[0]).unwrap().record.last_accessed_at.is_none());
        record_access(&catalog, ids[0]).unwrap();
        assert!(get_media(&catalog, ids[0]).unwrap().record.last_accessed_at.is_some());
        assert!(record_access(&catalog, 5).is_err());
    }
}
