// Per-file reconciliation against the catalog
//
// Decision order for a discovered file:
// 1) identity match   -> unchanged, or resized (fingerprint recomputed)
// 2) move candidate   -> record re-homed to the new path, keeps its id, flags and tags
// 3) otherwise        -> new record
//
// The slow parts (fingerprint, probe) run without holding the catalog lock.
// The decision is then re-taken inside the write transaction, so the write
// always matches the catalog state it was decided against.

use std::path::{Path, PathBuf};
use rusqlite::Connection;

use crate::db::schema::{self, MediaRecord, NewMedia};
use crate::db::Catalog;
use crate::error::{VidshelfError, Result};
use crate::hash::{compute_content_fingerprint, compute_identity};
use crate::metadata::MediaInfo;
use crate::preview::{ThumbnailJob, Transcoder};
use super::discover::DiscoveredFile;

/// Decides whether an existing record at another path is the same file, moved.
pub trait MovePolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `is_move` needs the new file's fingerprint.
    fn needs_fingerprint(&self) -> bool {
        false
    }

    /// `candidate` already matches the file's display name and byte size.
    fn is_move(&self, candidate: &MediaRecord, file: &DiscoveredFile, fingerprint: Option<&str>) -> bool;
}

/// Same display name and byte size.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameAndSize;

impl MovePolicy for NameAndSize {
    fn name(&self) -> &'static str {
        "name+size"
    }

    fn is_move(&self, _candidate: &MediaRecord, _file: &DiscoveredFile, _fingerprint: Option<&str>) -> bool {
        true
    }
}

/// Same display name, byte size and content fingerprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameSizeAndFingerprint;

impl MovePolicy for NameSizeAndFingerprint {
    fn name(&self) -> &'static str {
        "name+size+fingerprint"
    }

    fn needs_fingerprint(&self) -> bool {
        true
    }

    fn is_move(&self, candidate: &MediaRecord, _file: &DiscoveredFile, fingerprint: Option<&str>) -> bool {
        fingerprint == Some(candidate.content_fingerprint.as_str())
    }
}

/// Pick the policy named by configuration.
pub fn move_policy(strict: bool) -> Box<dyn MovePolicy> {
    if strict {
        Box::new(NameSizeAndFingerprint)
    } else {
        Box::new(NameAndSize)
    }
}

/// What happened to one file.
#[derive(Debug)]
pub enum ReconcileOutcome {
    Unchanged { id: i64 },
    Resized { id: i64 },
    Moved { id: i64, from: String },
    Added { id: i64, thumbnail: ThumbnailJob },
}

impl ReconcileOutcome {
    pub fn id(&self) -> i64 {
        match self {
            ReconcileOutcome::Unchanged { id }
            | ReconcileOutcome::Resized { id }
            | ReconcileOutcome::Moved { id, .. }
            | ReconcileOutcome::Added { id, .. } => *id,
        }
    }
}

/// Outcome plus non-fatal problems met on the way (a failed probe, say).
#[derive(Debug)]
pub struct FileReport {
    pub outcome: ReconcileOutcome,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
enum Plan {
    Unchanged { id: i64 },
    Resize { id: i64 },
    Move { record: MediaRecord },
    Insert,
}

#[derive(Debug)]
enum Step {
    Ready(Plan),
    NeedsFingerprint,
}

pub struct Reconciler<'a> {
    catalog: &'a Catalog,
    transcoder: &'a dyn Transcoder,
    policy: &'a dyn MovePolicy,
    watched_root: PathBuf,
    fingerprint_budget: u64,
    probe_metadata: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        catalog: &'a Catalog,
        transcoder: &'a dyn Transcoder,
        policy: &'a dyn MovePolicy,
        watched_root: &Path,
        fingerprint_budget: u64,
        probe_metadata: bool,
    ) -> Self {
        Self {
            catalog,
            transcoder,
            policy,
            watched_root: watched_root.to_path_buf(),
            fingerprint_budget,
            probe_metadata,
        }
    }

    pub fn reconcile(&self, file: &DiscoveredFile) -> Result<FileReport> {
        let identity = compute_identity(&file.relative_path);
        let mut warnings = Vec::new();

        // Decide with a short read; compute the fingerprint only if the decision needs it
        let mut fingerprint: Option<String> = None;
        let mut plan = self
            .catalog
            .with_conn(|conn| self.plan(conn, file, &identity, None))?;
        if let Step::NeedsFingerprint = plan {
            fingerprint = Some(compute_content_fingerprint(&file.absolute_path, self.fingerprint_budget)?);
            plan = self
                .catalog
                .with_conn(|conn| self.plan(conn, file, &identity, fingerprint.as_deref()))?;
        }

        let media_info = match plan {
            Step::Ready(Plan::Insert) if self.probe_metadata => {
                match self.transcoder.probe(&file.absolute_path) {
                    Ok(info) => Some(info),
                    Err(e) => {
                        warnings.push(format!(
                            "Could not read metadata for {}: {}",
                            file.relative_path, e
                        ));
                        None
                    }
                }
            }
            _ => None,
        };

        let outcome = self.catalog.with_transaction(|conn| {
            match self.plan(conn, file, &identity, fingerprint.as_deref())? {
                Step::Ready(plan) => {
                    self.apply(conn, plan, file, &identity, fingerprint.as_deref(), media_info.as_ref())
                }
                Step::NeedsFingerprint => Err(VidshelfError::Other(format!(
                    "Catalog changed while reconciling {}",
                    file.relative_path
                ))),
            }
        })?;

        match &outcome {
            ReconcileOutcome::Unchanged { .. } => {}
            ReconcileOutcome::Resized { id } => {
                log::info!("Updated {} (id {}): size now {}", file.relative_path, id, file.byte_size)
            }
            ReconcileOutcome::Moved { id, from } => {
                log::info!("Moved {} -> {} (id {})", from, file.relative_path, id)
            }
            ReconcileOutcome::Added { id, .. } => log::info!("Added {} (id {})", file.relative_path, id),
        }

        Ok(FileReport { outcome, warnings })
    }

    fn plan(
        &self,
        conn: &Connection,
        file: &DiscoveredFile,
        identity: &str,
        fingerprint: Option<&str>,
    ) -> Result<Step> {
        if let Some(existing) = schema::get_media_by_identity(conn, identity)? {
            if existing.byte_size == file.byte_size {
                return Ok(Step::Ready(Plan::Unchanged { id: existing.id }));
            }
            return Ok(match fingerprint {
                Some(_) => Step::Ready(Plan::Resize { id: existing.id }),
                None => Step::NeedsFingerprint,
            });
        }

        // A candidate whose old path still exists is a second copy, not a move
        let candidates: Vec<MediaRecord> =
            schema::find_media_by_name_and_size(conn, &file.display_name, file.byte_size)?
                .into_iter()
                .filter(|c| !self.watched_root.join(&c.relative_path).exists())
                .collect();

        if !candidates.is_empty() && self.policy.needs_fingerprint() && fingerprint.is_none() {
            return Ok(Step::NeedsFingerprint);
        }

        if let Some(record) = candidates
            .into_iter()
            .find(|c| self.policy.is_move(c, file, fingerprint))
        {
            return Ok(Step::Ready(Plan::Move { record }));
        }

        Ok(match fingerprint {
            Some(_) => Step::Ready(Plan::Insert),
            None => Step::NeedsFingerprint,
        })
    }

    fn apply(
        &self,
        conn: &Connection,
        plan: Plan,
        file: &DiscoveredFile,
        identity: &str,
        fingerprint: Option<&str>,
        media_info: Option<&MediaInfo>,
    ) -> Result<ReconcileOutcome> {
        match plan {
            Plan::Unchanged { id } => Ok(ReconcileOutcome::Unchanged { id }),
            Plan::Resize { id } => {
                let fingerprint = required(fingerprint, file)?;
                schema::update_media_content(conn, id, file.byte_size, fingerprint)?;
                Ok(ReconcileOutcome::Resized { id })
            }
            Plan::Move { record } => {
                schema::update_media_location(conn, record.id, identity, &file.relative_path)?;
                Ok(ReconcileOutcome::Moved {
                    id: record.id,
                    from: record.relative_path,
                })
            }
            Plan::Insert => {
                let fingerprint = required(fingerprint, file)?;
                let id = schema::insert_media(
                    conn,
                    &NewMedia {
                        identity: identity.to_string(),
                        display_name: file.display_name.clone(),
                        relative_path: file.relative_path.clone(),
                        byte_size: file.byte_size,
                        content_fingerprint: fingerprint.to_string(),
                        media_info: media_info.cloned(),
                    },
                )?;
                Ok(ReconcileOutcome::Added {
                    id,
                    thumbnail: ThumbnailJob {
                        identity: identity.to_string(),
                        display_name: file.display_name.clone(),
                        source: file.absolute_path.clone(),
                        source_duration: media_info.and_then(|m| m.duration_secs),
                    },
                })
            }
        }
    }
}

fn required<'f>(fingerprint: Option<&'f str>, file: &DiscoveredFile) -> Result<&'f str> {
    fingerprint.ok_or_else(|| {
        VidshelfError::Hash(format!("No fingerprint computed for {}", file.relative_path))
    })
}
