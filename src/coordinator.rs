//! Debounced auto-save.
//!
//! Each note id owns at most one pending payload and one timer task. A new
//! edit replaces the payload and re-arms the timer; when the timer fires the
//! payload goes through [`VersionHistory::apply_edit`] and is written via the
//! [`NoteCache`]. The delay shrinks as unsaved changes age, so a note being
//! edited continuously is still persisted at least every `max_delay`.
//!
//! Writes to one note are serialized by a [`WriteGuard`]. A firing timer
//! holds it from `apply_edit` through the save, and so does any caller that
//! reads a note, changes it and writes it back.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex,
    },
    time::Duration,
};

use log::{debug, error, info, trace};
use serde::{Deserialize, Serialize};
use tokio::{task::JoinHandle, time::Instant};

use crate::{Note, NoteCache, Result, VaultError, VersionHistory};

/// Lower bound for any armed delay.
pub const MIN_DELAY: Duration = Duration::from_millis(100);

/// Debounce timing, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveSettings {
    /// Quiet period after the last edit
    pub base_delay_ms: u64,
    /// Upper bound on how long an edit may stay unsaved
    pub max_delay_ms: u64,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 2000,
            max_delay_ms: 10_000,
        }
    }
}

impl AutosaveSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// `clamp(base, MIN_DELAY, max - elapsed)`, never below `MIN_DELAY`.
    pub fn delay_after(&self, elapsed: Duration) -> Duration {
        let remaining = self.max_delay().saturating_sub(elapsed);
        self.base_delay().min(remaining).max(MIN_DELAY)
    }
}

/// Called with the note id and the error when an auto-save fails.
pub type PersistErrorHandler = Arc<dyn Fn(&str, &VaultError) + Send + Sync>;

struct PendingWrite {
    note: Note,
    /// When this note first had unsaved changes
    pending_since: Instant,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    cache: Arc<NoteCache>,
    history: VersionHistory,
    settings: AutosaveSettings,
    slots: Mutex<HashMap<String, PendingWrite>>,
    last_persist: Mutex<HashMap<String, Instant>>,
    next_generation: AtomicU64,
    on_error: Mutex<Option<PersistErrorHandler>>,
    /// Note ids with a write in progress
    writing: Mutex<HashSet<String>>,
    write_done: Condvar,
}

/// Exclusive write access to one note, released on drop.
pub struct WriteGuard {
    shared: Arc<Shared>,
    note_id: String,
}

impl WriteGuard {
    pub fn note_id(&self) -> &str {
        &self.note_id
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if let Ok(mut writing) = self.shared.writing.lock() {
            writing.remove(&self.note_id);
        }
        self.shared.write_done.notify_all();
        trace!("Released write guard for {}", self.note_id);
    }
}

/// Turns a stream of edits into bounded-latency durable writes.
#[derive(Clone)]
pub struct WriteCoordinator {
    shared: Arc<Shared>,
}

impl WriteCoordinator {
    pub fn new(cache: Arc<NoteCache>, history: VersionHistory, settings: AutosaveSettings) -> Self {
        info!(
            "Initializing write coordinator (base {}ms, max {}ms)",
            settings.base_delay_ms, settings.max_delay_ms
        );
        Self {
            shared: Arc::new(Shared {
                cache,
                history,
                settings,
                slots: Mutex::new(HashMap::new()),
                last_persist: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                on_error: Mutex::new(None),
                writing: Mutex::new(HashSet::new()),
                write_done: Condvar::new(),
            }),
        }
    }

    pub fn settings(&self) -> AutosaveSettings {
        self.shared.settings
    }

    /// Installs the callback for failed auto-saves.
    pub fn set_error_handler(&self, handler: PersistErrorHandler) {
        if let Ok(mut on_error) = self.shared.on_error.lock() {
            *on_error = Some(handler);
        }
    }

    /// Buffers `note` as the pending write for its id and (re)arms the timer.
    ///
    /// Must be called from within a tokio runtime. Returns the armed delay.
    pub fn on_edit(&self, note: Note) -> Result<Duration> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| VaultError::Runtime {
            message: format!("Auto-save needs a tokio runtime: {}", e),
        })?;
        let id = note.id.clone();
        let now = Instant::now();
        let generation = self.shared.next_generation.fetch_add(1, Ordering::SeqCst);

        let last_persist = self
            .shared
            .last_persist
            .lock()
            .map_err(|_| VaultError::poisoned("persist times"))?
            .get(&id)
            .copied();

        let mut slots = self
            .shared
            .slots
            .lock()
            .map_err(|_| VaultError::poisoned("pending writes"))?;

        let pending_since = match slots.remove(&id) {
            Some(previous) => {
                if let Some(timer) = previous.timer {
                    timer.abort();
                }
                previous.pending_since
            }
            None => now,
        };

        let anchor = match last_persist {
            Some(persisted) if persisted > pending_since => persisted,
            _ => pending_since,
        };
        let delay = self
            .shared
            .settings
            .delay_after(now.saturating_duration_since(anchor));

        let shared = Arc::clone(&self.shared);
        let timer_id = id.clone();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire(&timer_id, generation);
        });

        slots.insert(
            id.clone(),
            PendingWrite {
                note,
                pending_since,
                generation,
                timer: Some(timer),
            },
        );
        trace!("Armed auto-save for {} in {:?}", id, delay);
        Ok(delay)
    }

    /// Waits until no other write to `note_id` is in flight and claims it.
    ///
    /// Not reentrant: a thread already holding the guard for `note_id` must
    /// use [`flush_held`](Self::flush_held) instead of [`flush`](Self::flush).
    pub fn acquire(&self, note_id: &str) -> Result<WriteGuard> {
        self.shared.acquire(note_id)
    }

    /// Persists the pending write for `note_id` now. Returns whether one existed.
    ///
    /// Blocks while an auto-save of the same note is in flight.
    pub fn flush(&self, note_id: &str) -> Result<bool> {
        let guard = self.acquire(note_id)?;
        self.flush_held(&guard)
    }

    /// [`flush`](Self::flush) for a caller already holding the note's guard.
    pub fn flush_held(&self, guard: &WriteGuard) -> Result<bool> {
        let note_id = guard.note_id();
        let Some(pending) = self.shared.take(note_id, None)? else {
            return Ok(false);
        };
        self.shared.persist(pending.note)?;
        debug!("Flushed pending write for {}", note_id);
        Ok(true)
    }

    /// Flushes every pending write, continuing past failures.
    ///
    /// Returns the number persisted, or the first error encountered.
    pub fn flush_all(&self) -> Result<usize> {
        let ids = self.pending_ids();
        let mut flushed = 0;
        let mut first_error = None;

        for id in ids {
            match self.flush(&id) {
                Ok(true) => flushed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to flush pending write for {}: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(flushed),
        }
    }

    /// Drops the pending write for `note_id` without persisting it.
    pub fn cancel(&self, note_id: &str) -> bool {
        match self.shared.take(note_id, None) {
            Ok(Some(_)) => {
                debug!("Cancelled pending write for {}", note_id);
                true
            }
            _ => false,
        }
    }

    /// Drops every pending write.
    pub fn cancel_all(&self) -> usize {
        self.pending_ids()
            .iter()
            .filter(|id| self.cancel(id))
            .count()
    }

    pub fn has_pending(&self, note_id: &str) -> bool {
        self.shared
            .slots
            .lock()
            .map(|slots| slots.contains_key(note_id))
            .unwrap_or(false)
    }

    /// The pending payload for `note_id`, if any.
    pub fn pending(&self, note_id: &str) -> Option<Note> {
        self.shared
            .slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(note_id).map(|p| p.note.clone()))
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.shared
            .slots
            .lock()
            .map(|slots| slots.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_persisted_at(&self, note_id: &str) -> Option<Instant> {
        self.shared
            .last_persist
            .lock()
            .ok()
            .and_then(|times| times.get(note_id).copied())
    }
}

impl Shared {
    fn acquire(self: &Arc<Self>, note_id: &str) -> Result<WriteGuard> {
        let mut writing = self
            .writing
            .lock()
            .map_err(|_| VaultError::poisoned("write guards"))?;
        while writing.contains(note_id) {
            trace!("Waiting for in-flight write to {}", note_id);
            writing = self
                .write_done
                .wait(writing)
                .map_err(|_| VaultError::poisoned("write guards"))?;
        }
        writing.insert(note_id.to_string());
        Ok(WriteGuard {
            shared: Arc::clone(self),
            note_id: note_id.to_string(),
        })
    }

    /// Removes the slot, aborting its timer. With `generation`, only a slot
    /// armed by that generation is taken.
    fn take(&self, note_id: &str, generation: Option<u64>) -> Result<Option<PendingWrite>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| VaultError::poisoned("pending writes"))?;

        let matches = match (slots.get(note_id), generation) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(pending), Some(generation)) => pending.generation == generation,
        };
        if !matches {
            return Ok(None);
        }

        let mut pending = slots.remove(note_id);
        if generation.is_none() {
            if let Some(timer) = pending.as_mut().and_then(|p| p.timer.take()) {
                timer.abort();
            }
        }
        Ok(pending)
    }

    fn fire(self: &Arc<Self>, note_id: &str, generation: u64) {
        // claim the note before the slot so a concurrent lock or delete
        // either finishes first or sees the payload still pending
        let _guard = match self.acquire(note_id) {
            Ok(guard) => guard,
            Err(e) => {
                self.report(note_id, &e);
                return;
            }
        };
        let pending = match self.take(note_id, Some(generation)) {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                trace!("Stale auto-save timer for {} ignored", note_id);
                return;
            }
            Err(e) => {
                self.report(note_id, &e);
                return;
            }
        };

        match self.persist(pending.note) {
            Ok(()) => debug!("Auto-saved note {}", note_id),
            Err(e) => self.report(note_id, &e),
        }
    }

    fn persist(&self, note: Note) -> Result<()> {
        let id = note.id.clone();
        let merged = self.history.apply_edit(note)?;
        self.cache.save(&merged)?;
        self.last_persist
            .lock()
            .map_err(|_| VaultError::poisoned("persist times"))?
            .insert(id, Instant::now());
        Ok(())
    }

    fn report(&self, note_id: &str, err: &VaultError) {
        error!("Auto-save failed for note {}: {}", note_id, err);
        let handler = self.on_error.lock().ok().and_then(|h| h.clone());
        if let Some(handler) = handler {
            handler(note_id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Clock, ManualClock, MemoryStore, NoteStore, DEFAULT_LIST_TTL_SECS};

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<NoteCache>,
        clock: Arc<ManualClock>,
        coordinator: WriteCoordinator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(NoteCache::new(
            store.clone(),
            clock.clone(),
            DEFAULT_LIST_TTL_SECS,
        ));
        let history = VersionHistory::new(cache.clone(), clock.clone());
        let coordinator =
            WriteCoordinator::new(cache.clone(), history, AutosaveSettings::default());
        Fixture {
            store,
            cache,
            clock,
            coordinator,
        }
    }

    fn stored_content(store: &MemoryStore, id: &str) -> Option<String> {
        store.get(id).unwrap().map(|n| n.content)
    }

    #[test]
    fn delay_formula_bounds() {
        let settings = AutosaveSettings::default();
        assert_eq!(settings.delay_after(Duration::ZERO), Duration::from_millis(2000));
        assert_eq!(
            settings.delay_after(Duration::from_millis(9000)),
            Duration::from_millis(1000)
        );
        assert_eq!(settings.delay_after(Duration::from_millis(9950)), MIN_DELAY);
        assert_eq!(settings.delay_after(Duration::from_secs(60)), MIN_DELAY);

        let tight = AutosaveSettings {
            base_delay_ms: 50_000,
            max_delay_ms: 3000,
        };
        assert_eq!(tight.delay_after(Duration::ZERO), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_write() {
        let f = fixture();
        let note = Note::new("A", "hello", vec![], f.clock.now());
        f.cache.save(&note).unwrap();

        for i in 0..5 {
            let mut edit = note.clone();
            edit.set_content(format!("hello {}", i));
            f.coordinator.on_edit(edit).unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert_eq!(stored_content(&f.store, &note.id).unwrap(), "hello");

        tokio::time::sleep(Duration::from_millis(2100)).await;
        let stored = f.store.get(&note.id).unwrap().unwrap();
        assert_eq!(stored.content, "hello 4");
        // one write means one snapshot
        assert_eq!(stored.versions.len(), 1);
        assert_eq!(stored.versions[0].content, "hello");
        assert!(!f.coordinator.has_pending(&note.id));
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_editing_persists_within_max_delay() {
        let f = fixture();
        let note = Note::new("A", "start", vec![], f.clock.now());
        f.cache.save(&note).unwrap();

        let mut persisted_at = None;
        for i in 0..40 {
            let mut edit = note.clone();
            edit.set_content(format!("typing {}", i));
            let delay = f.coordinator.on_edit(edit).unwrap();
            assert!(delay >= MIN_DELAY && delay <= f.coordinator.settings().max_delay());
            tokio::time::sleep(Duration::from_millis(400)).await;
            if persisted_at.is_none() && stored_content(&f.store, &note.id).unwrap() != "start" {
                persisted_at = Some(i);
            }
        }

        // 400ms per edit: the first write lands before 10s of unsaved typing
        let first = persisted_at.expect("continuous edits were never persisted");
        assert!(first <= 25, "first write after {} edits", first);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_persists_immediately_and_cancels_timer() {
        let f = fixture();
        let note = Note::new("A", "hello", vec![], f.clock.now());
        f.cache.save(&note).unwrap();

        let mut edit = note.clone();
        edit.set_content("hello world");
        f.coordinator.on_edit(edit).unwrap();

        assert!(f.coordinator.flush(&note.id).unwrap());
        assert_eq!(stored_content(&f.store, &note.id).unwrap(), "hello world");
        assert!(f.coordinator.last_persisted_at(&note.id).is_some());

        // the aborted timer must not write again
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.store.get(&note.id).unwrap().unwrap().versions.len(), 1);
        assert!(!f.coordinator.flush(&note.id).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_payload() {
        let f = fixture();
        let note = Note::new("A", "hello", vec![], f.clock.now());
        f.cache.save(&note).unwrap();

        let mut edit = note.clone();
        edit.set_content("discarded");
        f.coordinator.on_edit(edit).unwrap();
        assert!(f.coordinator.cancel(&note.id));
        assert!(!f.coordinator.cancel(&note.id));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(stored_content(&f.store, &note.id).unwrap(), "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_auto_save_reports_and_drops_payload() {
        let f = fixture();
        let note = Note::new("A", "hello", vec![], f.clock.now());
        f.cache.save(&note).unwrap();

        let failures = Arc::new(Mutex::new(Vec::new()));
        let seen = failures.clone();
        f.coordinator.set_error_handler(Arc::new(move |id: &str, err: &VaultError| {
            seen.lock().unwrap().push((id.to_string(), err.to_string()));
        }));

        f.store.set_simulate_write_error(true);
        let mut edit = note.clone();
        edit.set_content("lost");
        f.coordinator.on_edit(edit).unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, note.id);
        assert!(!f.coordinator.has_pending(&note.id));

        f.store.set_simulate_write_error(false);
        assert_eq!(stored_content(&f.store, &note.id).unwrap(), "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn latest_edit_wins() {
        let f = fixture();
        let note = Note::new("A", "a", vec![], f.clock.now());
        f.cache.save(&note).unwrap();

        for content in ["b", "c", "d"] {
            let mut edit = note.clone();
            edit.set_content(content);
            f.coordinator.on_edit(edit).unwrap();
        }
        assert_eq!(f.coordinator.pending(&note.id).unwrap().content, "d");
        assert_eq!(f.coordinator.pending_ids(), vec![note.id.clone()]);

        assert_eq!(f.coordinator.flush_all().unwrap(), 1);
        assert_eq!(stored_content(&f.store, &note.id).unwrap(), "d");
    }

    #[tokio::test(start_paused = true)]
    async fn new_note_is_persisted_on_fire() {
        let f = fixture();
        let note = Note::new("fresh", "draft", vec![], f.clock.now());
        f.coordinator.on_edit(note.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let stored = f.store.get(&note.id).unwrap().unwrap();
        assert_eq!(stored.content, "draft");
        assert!(stored.versions.is_empty());
    }

    #[test]
    fn edit_outside_runtime_is_an_error() {
        let f = fixture();
        let note = Note::new("A", "v0", vec![], f.clock.now());
        assert!(matches!(
            f.coordinator.on_edit(note.clone()),
            Err(VaultError::Runtime { .. })
        ));
        assert!(!f.coordinator.has_pending(&note.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timer_waits_for_held_guard() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(NoteCache::new(
            store.clone(),
            clock.clone(),
            DEFAULT_LIST_TTL_SECS,
        ));
        let history = VersionHistory::new(cache.clone(), clock.clone());
        let coordinator = WriteCoordinator::new(
            cache.clone(),
            history,
            AutosaveSettings {
                base_delay_ms: 10,
                max_delay_ms: 100,
            },
        );
        let note = Note::new("A", "v0", vec![], clock.now());
        cache.save(&note).unwrap();

        let guard = coordinator.acquire(&note.id).unwrap();
        let mut edited = note.clone();
        edited.set_content("v1");
        coordinator.on_edit(edited).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // the timer is parked on the guard, so the payload is still pending
        assert_eq!(stored_content(&store, &note.id).unwrap(), "v0");
        assert!(coordinator.flush_held(&guard).unwrap());
        drop(guard);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stored = store.get(&note.id).unwrap().unwrap();
        assert_eq!(stored.content, "v1");
        assert_eq!(stored.versions.len(), 1);
    }
}
