//! Per-note version history.
//!
//! Snapshots are appended to the note record itself (`Note::versions`) and
//! persisted through the [`NoteCache`]. Operations on an unknown note or
//! version return `None` / `false` rather than an error.

use std::sync::Arc;

use log::{debug, info};

use crate::{Clock, Note, NoteCache, NoteVersion, Result, VaultError};

#[derive(Clone)]
pub struct VersionHistory {
    cache: Arc<NoteCache>,
    clock: Arc<dyn Clock>,
}

impl VersionHistory {
    pub fn new(cache: Arc<NoteCache>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    /// Records `title`/`content` as the newest snapshot of the stored note.
    pub fn snapshot_before_edit(
        &self,
        note_id: &str,
        current_title: &str,
        current_content: &str,
    ) -> Result<Option<NoteVersion>> {
        let Some(mut note) = self.cache.get(note_id) else {
            return Ok(None);
        };
        let version = note.push_snapshot(current_title, current_content, self.clock.now());
        self.cache.save(&note)?;
        debug!(
            "Snapshot v{} taken for note {}",
            version.version_number, note_id
        );
        Ok(Some(version))
    }

    /// Prepares an edited note for persisting over the stored record.
    ///
    /// History, encryption state and creation time are taken from the stored
    /// record. A snapshot of the stored title/content is appended only when
    /// the edit actually changes one of them.
    pub fn apply_edit(&self, mut incoming: Note) -> Result<Note> {
        let now = self.clock.now();
        incoming.refresh_plain_text();

        let Some(stored) = self.cache.get(&incoming.id) else {
            debug!("No stored record for {}, persisting as new", incoming.id);
            incoming.updated_at = now;
            return Ok(incoming);
        };

        if stored.is_encrypted {
            return Err(VaultError::NoteLocked { id: stored.id });
        }

        incoming.created_at = stored.created_at;
        incoming.is_encrypted = stored.is_encrypted;
        incoming.has_been_encrypted = stored.has_been_encrypted;
        incoming.encrypted_data = stored.encrypted_data.clone();
        incoming.version = stored.version;
        incoming.versions = stored.versions.clone();

        if stored.differs_from(&incoming.title, &incoming.content) {
            let version = incoming.push_snapshot(&stored.title, &stored.content, now);
            debug!(
                "Snapshot v{} taken for note {}",
                version.version_number, incoming.id
            );
        }
        incoming.updated_at = now;
        Ok(incoming)
    }

    /// Overwrites the live title/content with a snapshot.
    ///
    /// The pre-restore state is not recorded as a version.
    pub fn restore_to_version(&self, note_id: &str, version_id: &str) -> Result<Option<Note>> {
        let Some(mut note) = self.cache.get(note_id) else {
            return Ok(None);
        };
        if note.is_encrypted {
            return Err(VaultError::NoteLocked { id: note.id });
        }
        let Some(version) = note.find_version(version_id).cloned() else {
            return Ok(None);
        };

        note.title = version.title;
        note.set_content(version.content);
        note.updated_at = self.clock.now();
        self.cache.save(&note)?;
        info!(
            "Note {} restored to version {}",
            note_id, version.version_number
        );
        Ok(Some(note))
    }

    /// Removes one snapshot. Returns whether it existed.
    pub fn delete_version(&self, note_id: &str, version_id: &str) -> Result<bool> {
        let Some(mut note) = self.cache.get(note_id) else {
            return Ok(false);
        };
        let before = note.versions.len();
        note.versions.retain(|v| v.id != version_id);
        if note.versions.len() == before {
            return Ok(false);
        }
        note.updated_at = self.clock.now();
        self.cache.save(&note)?;
        debug!("Deleted version {} of note {}", version_id, note_id);
        Ok(true)
    }

    /// Drops every snapshot and resets numbering so the next one is 1.
    pub fn clear_versions(&self, note_id: &str) -> Result<bool> {
        let Some(mut note) = self.cache.get(note_id) else {
            return Ok(false);
        };
        note.versions.clear();
        note.version = 0;
        note.updated_at = self.clock.now();
        self.cache.save(&note)?;
        info!("Cleared version history of note {}", note_id);
        Ok(true)
    }

    /// Snapshots newest first. Snapshots hold plaintext, so a locked note
    /// refuses to list them.
    pub fn list_versions(&self, note_id: &str) -> Result<Option<Vec<NoteVersion>>> {
        let Some(note) = self.cache.get(note_id) else {
            return Ok(None);
        };
        if note.is_encrypted {
            return Err(VaultError::NoteLocked { id: note.id });
        }
        let mut versions = note.versions;
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(Some(versions))
    }
}
