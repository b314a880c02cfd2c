//! Read cache over a [`NoteStore`].
//!
//! Two caches with different trust rules: single notes are cached until a
//! write through this layer replaces or removes them, while the sorted
//! "all notes" list expires after a TTL. Reads never fail (store errors
//! degrade to "not found" / empty); writes always propagate.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use log::{debug, info, trace, warn};

use crate::{Clock, Note, NoteStore, Result, VaultError};

/// Default lifetime of the all-notes list.
pub const DEFAULT_LIST_TTL_SECS: u64 = 5 * 60;

struct ListSnapshot {
    notes: Vec<Note>,
    loaded_at: DateTime<Utc>,
}

pub struct NoteCache {
    store: Arc<dyn NoteStore>,
    clock: Arc<dyn Clock>,
    list_ttl: Duration,
    notes: Mutex<HashMap<String, Note>>,
    all_notes: Mutex<Option<ListSnapshot>>,
}

impl NoteCache {
    pub fn new(store: Arc<dyn NoteStore>, clock: Arc<dyn Clock>, list_ttl_secs: u64) -> Self {
        Self {
            store,
            clock,
            list_ttl: Duration::seconds(list_ttl_secs as i64),
            notes: Mutex::new(HashMap::new()),
            all_notes: Mutex::new(None),
        }
    }

    /// Retrieves a note by its ID, reading through to the store on a miss.
    pub fn get(&self, id: &str) -> Option<Note> {
        match self.notes.lock() {
            Ok(cache) => {
                if let Some(note) = cache.get(id) {
                    trace!("Note found in cache: {}", id);
                    return Some(note.clone());
                }
            }
            Err(e) => warn!("Failed to acquire lock on note cache: {}", e),
        }

        debug!("Note not in cache, reading from store: {}", id);
        match self.store.get(id) {
            Ok(Some(note)) => {
                if let Ok(mut cache) = self.notes.lock() {
                    cache.insert(id.to_string(), note.clone());
                }
                Some(note)
            }
            Ok(None) => {
                debug!("Note not found: {}", id);
                None
            }
            Err(e) => {
                warn!("Store read failed for note {}: {}", id, e);
                None
            }
        }
    }

    /// All notes, pinned first, then most recently updated first.
    pub fn get_all(&self) -> Vec<Note> {
        let now = self.clock.now();

        if let Ok(all) = self.all_notes.lock() {
            if let Some(snapshot) = all.as_ref() {
                if now - snapshot.loaded_at < self.list_ttl {
                    trace!("Serving {} notes from list cache", snapshot.notes.len());
                    return snapshot.notes.clone();
                }
                debug!("List cache expired");
            }
        }

        match self.load_all() {
            Ok(notes) => notes,
            Err(e) => {
                warn!("Store scan failed, returning no notes: {}", e);
                Vec::new()
            }
        }
    }

    /// Rescans the store, bypassing the list TTL, and refreshes the list cache.
    ///
    /// Unlike [`get_all`](Self::get_all) a scan failure is returned.
    pub fn load_all(&self) -> Result<Vec<Note>> {
        let now = self.clock.now();
        let mut notes = self.store.scan()?;
        sort_for_listing(&mut notes);

        if let Ok(mut all) = self.all_notes.lock() {
            *all = Some(ListSnapshot {
                notes: notes.clone(),
                loaded_at: now,
            });
        }
        debug!("Loaded {} notes into list cache", notes.len());
        Ok(notes)
    }

    /// Writes through to the store, then refreshes the point cache.
    pub fn save(&self, note: &Note) -> Result<()> {
        self.store.put(note)?;
        self.notes
            .lock()
            .map_err(|_| VaultError::poisoned("note cache"))?
            .insert(note.id.clone(), note.clone());
        self.invalidate_list();
        trace!("Saved note {}", note.id);
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        self.notes
            .lock()
            .map_err(|_| VaultError::poisoned("note cache"))?
            .remove(id);
        self.invalidate_list();
        debug!("Deleted note {}", id);
        Ok(())
    }

    pub fn batch_save(&self, notes: &[Note]) -> Result<()> {
        if let Err(e) = self.store.bulk_put(notes) {
            // partial writes leave the store state unknown for these ids
            self.forget(notes.iter().map(|n| n.id.as_str()));
            self.invalidate_list();
            return Err(e);
        }
        {
            let mut cache = self
                .notes
                .lock()
                .map_err(|_| VaultError::poisoned("note cache"))?;
            for note in notes {
                cache.insert(note.id.clone(), note.clone());
            }
        }
        self.invalidate_list();
        info!("Saved batch of {} notes", notes.len());
        Ok(())
    }

    pub fn batch_delete(&self, ids: &[String]) -> Result<()> {
        let result = self.store.bulk_delete(ids);
        self.forget(ids.iter().map(String::as_str));
        self.invalidate_list();
        result?;
        info!("Deleted batch of {} notes", ids.len());
        Ok(())
    }

    /// Replaces the entire note set.
    ///
    /// The new notes are written before anything is removed, so a rejected
    /// write leaves every existing note in the store.
    pub fn replace_all(&self, notes: &[Note]) -> Result<()> {
        let existing = self.store.scan()?;
        self.batch_save(notes)?;

        let keep: HashSet<&str> = notes.iter().map(|n| n.id.as_str()).collect();
        let stale: Vec<String> = existing
            .into_iter()
            .map(|n| n.id)
            .filter(|id| !keep.contains(id.as_str()))
            .collect();
        self.batch_delete(&stale)?;
        info!(
            "Replaced note set: {} written, {} removed",
            notes.len(),
            stale.len()
        );
        Ok(())
    }

    /// Searches notes by title and plain text using fuzzy matching.
    ///
    /// Title matches weigh double. Locked notes have no plaintext and never match.
    pub fn search(&self, query: &str) -> Vec<Note> {
        info!("Searching notes with query: '{}'", query);
        let matcher = SkimMatcherV2::default();

        let mut scored: Vec<(i64, Note)> = self
            .get_all()
            .into_iter()
            .filter_map(|note| {
                let title_score = matcher.fuzzy_match(&note.title, query).unwrap_or(0);
                let text_score = matcher
                    .fuzzy_match(&note.plain_text_content, query)
                    .unwrap_or(0);
                let score = title_score * 2 + text_score;
                (score > 0).then_some((score, note))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, note)| note).collect()
    }

    /// Notes carrying `tag`, compared case-insensitively.
    pub fn notes_by_tag(&self, tag: &str) -> Vec<Note> {
        let search_tag = tag.trim().to_lowercase();
        self.get_all()
            .into_iter()
            .filter(|note| {
                note.tags
                    .iter()
                    .any(|t| t.trim().to_lowercase() == search_tag)
            })
            .collect()
    }

    pub fn invalidate_list(&self) {
        if let Ok(mut all) = self.all_notes.lock() {
            *all = None;
        }
    }

    /// Drops both caches.
    pub fn invalidate_all(&self) {
        if let Ok(mut cache) = self.notes.lock() {
            cache.clear();
        }
        self.invalidate_list();
    }

    fn forget<'a>(&self, ids: impl Iterator<Item = &'a str>) {
        if let Ok(mut cache) = self.notes.lock() {
            for id in ids {
                cache.remove(id);
            }
        }
    }
}

fn sort_for_listing(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
}
