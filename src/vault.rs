//! The engine facade.
//!
//! `NoteVault` wires the store, caches, version history, write coordinator
//! and session passwords together and exposes the user-level flows. Every
//! dependency is injected so several vaults can live side by side.
//!
//! Every flow that reads a note and writes it back holds the coordinator's
//! [`WriteGuard`] for that note, so it cannot interleave with an auto-save.

use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};

use crate::{
    crypto, Clock, Config, ExportBundle, ImportSummary, JsonFileStore, Note, NoteCache, NoteStore,
    NoteVersion, PersistErrorHandler, Result, SessionPasswords, SystemClock, VaultError,
    VersionHistory, WriteCoordinator, WriteGuard,
};

pub struct NoteVault {
    cache: Arc<NoteCache>,
    history: VersionHistory,
    coordinator: WriteCoordinator,
    passwords: SessionPasswords,
    clock: Arc<dyn Clock>,
}

impl NoteVault {
    /// Opens the on-disk vault described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = JsonFileStore::open(config.notes_dir())?;
        Ok(Self::with_store(Arc::new(store), Arc::new(SystemClock), config))
    }

    pub fn with_store(store: Arc<dyn NoteStore>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let cache = Arc::new(NoteCache::new(
            store,
            Arc::clone(&clock),
            config.list_cache_ttl_secs,
        ));
        let history = VersionHistory::new(Arc::clone(&cache), Arc::clone(&clock));
        let coordinator =
            WriteCoordinator::new(Arc::clone(&cache), history.clone(), config.autosave);

        Self {
            cache,
            history,
            coordinator,
            passwords: SessionPasswords::new(),
            clock,
        }
    }

    pub fn cache(&self) -> &NoteCache {
        &self.cache
    }

    pub fn history(&self) -> &VersionHistory {
        &self.history
    }

    pub fn coordinator(&self) -> &WriteCoordinator {
        &self.coordinator
    }

    pub fn passwords(&self) -> &SessionPasswords {
        &self.passwords
    }

    pub fn set_error_handler(&self, handler: PersistErrorHandler) {
        self.coordinator.set_error_handler(handler);
    }

    pub fn create_note(&self, title: &str, content: &str, tags: Vec<String>) -> Result<Note> {
        let note = Note::new(title, content, tags, self.clock.now());
        self.cache.save(&note)?;
        info!("Created note {}", note.id);
        Ok(note)
    }

    /// Opens a note, bumping `lastAccessedAt`.
    ///
    /// A failure to record the access is logged and the note still returned.
    pub fn get_note(&self, id: &str) -> Option<Note> {
        let guard = self
            .coordinator
            .acquire(id)
            .inspect_err(|e| warn!("Failed to claim note {} for access tracking: {}", id, e))
            .ok();
        let mut note = self.cache.get(id)?;
        if guard.is_some() {
            note.last_accessed_at = self.clock.now();
            if let Err(e) = self.cache.save(&note) {
                warn!("Failed to record access to note {}: {}", id, e);
            }
        }
        Some(note)
    }

    pub fn list_notes(&self) -> Vec<Note> {
        self.cache.get_all()
    }

    pub fn search(&self, query: &str) -> Vec<Note> {
        self.cache.search(query)
    }

    pub fn notes_by_tag(&self, tag: &str) -> Vec<Note> {
        self.cache.notes_by_tag(tag)
    }

    /// Hands an editor change to the write coordinator.
    pub fn edit_note(&self, note: Note) -> Result<Duration> {
        if let Some(stored) = self.cache.get(&note.id) {
            if stored.is_encrypted {
                return Err(VaultError::NoteLocked { id: stored.id });
            }
        }
        self.coordinator.on_edit(note)
    }

    /// Persists any pending edit of `id` immediately.
    pub fn save_now(&self, id: &str) -> Result<bool> {
        self.coordinator.flush(id)
    }

    pub fn set_pinned(&self, id: &str, pinned: bool) -> Result<Note> {
        self.mutate(id, |note| note.is_pinned = pinned)
    }

    pub fn set_tags(&self, id: &str, tags: Vec<String>) -> Result<Note> {
        self.mutate(id, |note| note.tags = tags)
    }

    /// Stores the AI collaborator's result verbatim.
    pub fn set_ai_metadata(&self, id: &str, metadata: serde_json::Value) -> Result<Note> {
        self.mutate(id, |note| note.ai_metadata = Some(metadata))
    }

    /// Deletes a note, dropping any pending edit and session password.
    ///
    /// Returns whether the note existed.
    pub fn delete_note(&self, id: &str) -> Result<bool> {
        let _guard = self.coordinator.acquire(id)?;
        self.coordinator.cancel(id);
        self.passwords.clear(id);
        let existed = self.cache.get(id).is_some();
        self.cache.delete(id)?;
        if existed {
            info!("Deleted note {}", id);
        }
        Ok(existed)
    }

    /// Encrypts the note's title and content and clears the plaintext.
    ///
    /// A note that was encrypted before can only be locked again with the
    /// password on record.
    pub fn lock_note(&self, id: &str, password: &str) -> Result<Note> {
        let guard = self.coordinator.acquire(id)?;
        let mut note = self.current(&guard)?;
        if note.is_encrypted {
            return Err(VaultError::NoteLocked { id: note.id });
        }
        if note.has_been_encrypted {
            if let Some(previous) = &note.encrypted_data {
                if !crypto::verify(previous, password) {
                    return Err(VaultError::Decryption);
                }
            }
        }

        let envelope = crypto::lock(&note.title, &note.content, password)?;
        note.seal(envelope);
        note.updated_at = self.clock.now();
        self.cache.save(&note)?;
        info!("Locked note {}", id);
        Ok(note)
    }

    /// Decrypts a locked note back into its live fields.
    pub fn unlock_note(&self, id: &str, password: &str, remember: bool) -> Result<Note> {
        let guard = self.coordinator.acquire(id)?;
        self.unlock_held(&guard, password, remember)
    }

    fn unlock_held(&self, guard: &WriteGuard, password: &str, remember: bool) -> Result<Note> {
        let id = guard.note_id();
        let mut note = self.require(id)?;
        if !note.is_encrypted {
            return Err(VaultError::NotLocked { id: note.id });
        }
        let envelope = note.encrypted_data.clone().ok_or_else(|| VaultError::Validation {
            message: format!("Locked note {} has no ciphertext on record", id),
        })?;

        let plaintext = crypto::unlock(&envelope, password).inspect_err(|_| {
            debug!("Unlock of note {} rejected", id);
        })?;
        note.reveal(plaintext.title, plaintext.content);
        note.updated_at = self.clock.now();
        self.cache.save(&note)?;

        if remember {
            self.passwords.store(id, password);
        }
        info!("Unlocked note {}", id);
        Ok(note)
    }

    /// Unlocks with the password remembered this session, if any.
    ///
    /// A remembered password that no longer works is forgotten.
    pub fn auto_unlock(&self, id: &str) -> Result<Option<Note>> {
        let Some(password) = self.passwords.get(id) else {
            return Ok(None);
        };
        match self.unlock_note(id, &password, false) {
            Ok(note) => Ok(Some(note)),
            Err(VaultError::Decryption) => {
                self.passwords.clear(id);
                Err(VaultError::Decryption)
            }
            Err(e) => Err(e),
        }
    }

    /// Locks again with the password remembered this session, if any.
    pub fn relock_note(&self, id: &str) -> Result<Option<Note>> {
        match self.passwords.get(id) {
            Some(password) => self.lock_note(id, &password).map(Some),
            None => Ok(None),
        }
    }

    /// Drops the ciphertext for good. The password on record is required.
    pub fn remove_encryption(&self, id: &str, password: &str) -> Result<Note> {
        let guard = self.coordinator.acquire(id)?;
        let mut note = self.current(&guard)?;
        if note.is_encrypted {
            note = self.unlock_held(&guard, password, false)?;
        } else {
            match &note.encrypted_data {
                Some(envelope) if !crypto::verify(envelope, password) => {
                    return Err(VaultError::Decryption)
                }
                Some(_) => {}
                None => return Err(VaultError::NotLocked { id: note.id }),
            }
        }

        note.encrypted_data = None;
        note.updated_at = self.clock.now();
        self.cache.save(&note)?;
        self.passwords.clear(id);
        info!("Removed encryption from note {}", id);
        Ok(note)
    }

    /// Snapshots newest first. Refused with `NoteLocked` while the note is locked.
    pub fn versions(&self, id: &str) -> Result<Option<Vec<NoteVersion>>> {
        self.history.list_versions(id)
    }

    pub fn restore_version(&self, id: &str, version_id: &str) -> Result<Option<Note>> {
        let guard = self.coordinator.acquire(id)?;
        self.coordinator.flush_held(&guard)?;
        self.history.restore_to_version(id, version_id)
    }

    pub fn delete_version(&self, id: &str, version_id: &str) -> Result<bool> {
        let guard = self.coordinator.acquire(id)?;
        self.coordinator.flush_held(&guard)?;
        self.history.delete_version(id, version_id)
    }

    pub fn clear_versions(&self, id: &str) -> Result<bool> {
        let guard = self.coordinator.acquire(id)?;
        self.coordinator.flush_held(&guard)?;
        self.history.clear_versions(id)
    }

    /// Serializes every note plus `preferences` into one text blob.
    ///
    /// A store that cannot be scanned fails the export instead of producing
    /// an empty bundle.
    pub fn export(&self, preferences: serde_json::Value) -> Result<String> {
        self.coordinator.flush_all()?;
        let notes = self.cache.load_all()?;
        let bundle = ExportBundle::new(notes, preferences, self.clock.now());
        info!("Exporting {} notes", bundle.notes.len());
        bundle.to_text()
    }

    /// Replaces the full note set with the contents of an export blob.
    pub fn import(&self, text: &str) -> Result<ImportSummary> {
        let bundle = ExportBundle::from_text(text)?;

        let mut ids: Vec<String> = self
            .cache
            .load_all()?
            .into_iter()
            .map(|note| note.id)
            .chain(bundle.notes.iter().map(|note| note.id.clone()))
            .chain(self.coordinator.pending_ids())
            .collect();
        ids.sort();
        ids.dedup();
        // sorted acquisition order keeps concurrent imports from deadlocking
        let _guards = ids
            .iter()
            .map(|id| self.coordinator.acquire(id))
            .collect::<Result<Vec<_>>>()?;

        let dropped = self.coordinator.cancel_all();
        if dropped > 0 {
            warn!("Import discarded {} pending edits", dropped);
        }
        self.passwords.clear_all();
        self.cache.replace_all(&bundle.notes)?;

        info!("Imported {} notes", bundle.notes.len());
        Ok(ImportSummary {
            notes_imported: bundle.notes.len(),
            format_version: bundle.format_version,
            exported_at: bundle.export_date,
            preferences: bundle.preferences,
        })
    }

    /// Flushes pending edits and forgets session passwords.
    pub fn shutdown(&self) -> Result<usize> {
        info!("Shutting down note vault...");
        let flushed = self.coordinator.flush_all();
        self.passwords.clear_all();
        let flushed = flushed?;
        info!("Note vault shutdown complete ({} pending writes flushed)", flushed);
        Ok(flushed)
    }

    fn require(&self, id: &str) -> Result<Note> {
        self.cache.get(id).ok_or_else(|| VaultError::NoteNotFound { id: id.to_string() })
    }

    /// The stored note after any pending edit has been persisted.
    fn current(&self, guard: &WriteGuard) -> Result<Note> {
        self.coordinator.flush_held(guard)?;
        self.require(guard.note_id())
    }

    fn mutate(&self, id: &str, change: impl FnOnce(&mut Note)) -> Result<Note> {
        let guard = self.coordinator.acquire(id)?;
        let mut note = self.current(&guard)?;
        change(&mut note);
        note.updated_at = self.clock.now();
        self.cache.save(&note)?;
        Ok(note)
    }
}
