use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{Note, NoteStore, Result, VaultError};

/// In-memory store for tests and ephemeral sessions.
///
/// Read and write failures can be simulated to exercise the cache's
/// degrade-on-read / propagate-on-write policy.
#[derive(Default)]
pub struct MemoryStore {
    notes: Mutex<HashMap<String, Note>>,
    simulate_read_error: AtomicBool,
    simulate_write_error: AtomicBool,
    reads: AtomicUsize,
    scans: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_simulate_read_error(&self, simulate: bool) {
        self.simulate_read_error.store(simulate, Ordering::SeqCst);
    }

    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }

    /// Number of point reads that reached the store.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of full scans that reached the store.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Mutates a record behind the cache's back.
    pub fn put_raw(&self, note: Note) {
        if let Ok(mut notes) = self.notes.lock() {
            notes.insert(note.id.clone(), note);
        }
    }

    pub fn len(&self) -> usize {
        self.notes.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_read(&self) -> Result<()> {
        if self.simulate_read_error.load(Ordering::SeqCst) {
            return Err(VaultError::Storage {
                message: "Simulated read error".to_string(),
            });
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(VaultError::Storage {
                message: "Simulated write error".to_string(),
            });
        }
        Ok(())
    }
}

impl NoteStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Note>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        let notes = self.notes.lock().map_err(|_| VaultError::poisoned("memory store"))?;
        Ok(notes.get(id).cloned())
    }

    fn put(&self, note: &Note) -> Result<()> {
        self.check_write()?;
        let mut notes = self.notes.lock().map_err(|_| VaultError::poisoned("memory store"))?;
        notes.insert(note.id.clone(), note.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.check_write()?;
        let mut notes = self.notes.lock().map_err(|_| VaultError::poisoned("memory store"))?;
        notes.remove(id);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<Note>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        let notes = self.notes.lock().map_err(|_| VaultError::poisoned("memory store"))?;
        Ok(notes.values().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.check_write()?;
        let mut notes = self.notes.lock().map_err(|_| VaultError::poisoned("memory store"))?;
        notes.clear();
        Ok(())
    }
}
