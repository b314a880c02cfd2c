use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use notevault::{
    AutosaveSettings, Config, ManualClock, MemoryStore, Note, NoteStore, NoteVault, Result,
    VaultError,
};

fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, NoteVault) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::default());
    let vault = NoteVault::with_store(store.clone(), clock.clone(), &Config::default());
    (store, clock, vault)
}

/// Memory store whose writes of the content "SLOW" take a while, so an
/// auto-save can be caught mid-flight.
struct SlowStore {
    inner: MemoryStore,
}

impl NoteStore for SlowStore {
    fn get(&self, id: &str) -> Result<Option<Note>> {
        self.inner.get(id)
    }

    fn put(&self, note: &Note) -> Result<()> {
        if note.content == "SLOW" {
            std::thread::sleep(Duration::from_millis(500));
        }
        self.inner.put(note)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id)
    }

    fn scan(&self) -> Result<Vec<Note>> {
        self.inner.scan()
    }
}

fn slow_setup() -> (Arc<SlowStore>, NoteVault) {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
    });
    let config = Config {
        autosave: AutosaveSettings {
            base_delay_ms: 100,
            max_delay_ms: 1000,
        },
        ..Config::default()
    };
    let vault = NoteVault::with_store(store.clone(), Arc::new(ManualClock::default()), &config);
    (store, vault)
}

#[tokio::test(start_paused = true)]
async fn flushed_edit_snapshots_prior_content() {
    let (store, _, vault) = setup();
    let note = vault.create_note("A", "hello", vec![]).unwrap();

    let mut edited = note.clone();
    edited.set_content("hello world");
    vault.edit_note(edited).unwrap();

    // nothing written yet
    let stored = store.get(&note.id).unwrap().unwrap();
    assert_eq!(stored.content, "hello");
    assert!(stored.versions.is_empty());
    assert!(vault.coordinator().has_pending(&note.id));

    assert!(vault.save_now(&note.id).unwrap());
    let stored = store.get(&note.id).unwrap().unwrap();
    assert_eq!(stored.content, "hello world");
    assert_eq!(stored.version, 1);
    assert_eq!(stored.versions.len(), 1);
    assert_eq!(stored.versions[0].version_number, 1);
    assert_eq!(stored.versions[0].content, "hello");
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_writes_once() {
    let (store, _, vault) = setup();
    let note = vault.create_note("A", "v0", vec![]).unwrap();

    for i in 1..=5 {
        let mut edited = note.clone();
        edited.set_content(format!("v{}", i));
        let delay = vault.edit_note(edited).unwrap();
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    let stored = store.get(&note.id).unwrap().unwrap();
    assert_eq!(stored.content, "v5");
    assert_eq!(stored.versions.len(), 1);
    assert_eq!(stored.versions[0].content, "v0");
    assert!(!vault.coordinator().has_pending(&note.id));
}

#[tokio::test(start_paused = true)]
async fn continuous_typing_is_saved_within_max_delay() {
    let (store, _, vault) = setup();
    let note = vault.create_note("A", "", vec![]).unwrap();

    // one edit every second for 12 seconds never leaves a 2s quiet window
    for i in 1..=12 {
        let mut edited = note.clone();
        edited.set_content(format!("typed {}", i));
        vault.edit_note(edited).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    let stored = store.get(&note.id).unwrap().unwrap();
    assert!(stored.content.starts_with("typed"));
    assert!(vault.coordinator().last_persisted_at(&note.id).is_some());
}

#[test]
fn lock_unlock_round_trip_with_named_password() {
    let (_, _, vault) = setup();
    let note = vault.create_note("T", "C", vec![]).unwrap();

    vault.lock_note(&note.id, "Abc123!").unwrap();
    assert!(matches!(
        vault.unlock_note(&note.id, "wrong", false),
        Err(VaultError::Decryption)
    ));

    let unlocked = vault.unlock_note(&note.id, "Abc123!", false).unwrap();
    assert_eq!(unlocked.title, "T");
    assert_eq!(unlocked.content, "C");
}

#[tokio::test(start_paused = true)]
async fn clearing_history_restarts_numbering() {
    let (store, _, vault) = setup();
    let note = vault.create_note("A", "v0", vec![]).unwrap();

    for content in ["v1", "v2", "v3"] {
        let mut edited = note.clone();
        edited.set_content(content);
        vault.edit_note(edited).unwrap();
        vault.save_now(&note.id).unwrap();
    }
    assert_eq!(vault.versions(&note.id).unwrap().unwrap().len(), 3);

    assert!(vault.clear_versions(&note.id).unwrap());
    assert!(vault.versions(&note.id).unwrap().unwrap().is_empty());

    let mut edited = note.clone();
    edited.set_content("v4");
    vault.edit_note(edited).unwrap();
    vault.save_now(&note.id).unwrap();

    let stored = store.get(&note.id).unwrap().unwrap();
    assert_eq!(stored.versions.len(), 1);
    assert_eq!(stored.versions[0].version_number, 1);
}

#[tokio::test(start_paused = true)]
async fn restore_sets_snapshot_values() {
    let (_, _, vault) = setup();
    let note = vault.create_note("First", "<p>one</p>", vec![]).unwrap();

    let mut edited = note.clone();
    edited.title = "Second".to_string();
    edited.set_content("<p>two</p>");
    vault.edit_note(edited).unwrap();
    vault.save_now(&note.id).unwrap();

    let version = vault.versions(&note.id).unwrap().unwrap()[0].clone();
    let restored = vault.restore_version(&note.id, &version.id).unwrap().unwrap();
    assert_eq!(restored.title, "First");
    assert_eq!(restored.content, "<p>one</p>");
    assert_eq!(restored.plain_text_content, "one");
}

#[test]
fn saves_show_up_in_list_before_ttl() {
    let (_, _, vault) = setup();
    let first = vault.create_note("first", "", vec![]).unwrap();
    assert_eq!(vault.list_notes().len(), 1);

    vault.create_note("second", "", vec![]).unwrap();
    vault.set_pinned(&first.id, true).unwrap();
    let listed = vault.list_notes();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, first.id);
}

#[tokio::test(start_paused = true)]
async fn failed_autosave_reaches_error_handler() {
    let (store, _, vault) = setup();
    let note = vault.create_note("A", "v0", vec![]).unwrap();

    let failures = Arc::new(AtomicU32::new(0));
    let counter = failures.clone();
    vault.set_error_handler(Arc::new(move |_id: &str, _err: &VaultError| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    store.set_simulate_write_error(true);
    let mut edited = note.clone();
    edited.set_content("v1");
    vault.edit_note(edited).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(!vault.coordinator().has_pending(&note.id));
}

#[tokio::test(start_paused = true)]
async fn delete_cancels_pending_write() {
    let (store, _, vault) = setup();
    let note = vault.create_note("A", "v0", vec![]).unwrap();

    let mut edited = note.clone();
    edited.set_content("v1");
    vault.edit_note(edited).unwrap();
    assert!(vault.delete_note(&note.id).unwrap());

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(store.get(&note.id).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn export_then_import_replaces_everything() {
    let (_, _, vault) = setup();
    let kept = vault.create_note("kept", "<b>body</b>", vec!["a".into()]).unwrap();
    vault.lock_note(&kept.id, "pw").unwrap();
    let text = vault.export(serde_json::json!({"theme": "dark"})).unwrap();

    let (_, _, other) = setup();
    other.create_note("doomed", "", vec![]).unwrap();
    let mut pending = other.create_note("pending", "", vec![]).unwrap();
    pending.set_content("unsaved");
    other.edit_note(pending).unwrap();

    let summary = other.import(&text).unwrap();
    assert_eq!(summary.notes_imported, 1);
    assert_eq!(summary.format_version, "1.0.0");
    assert_eq!(summary.preferences["theme"], "dark");
    assert!(other.coordinator().pending_ids().is_empty());

    let notes = other.list_notes();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].is_encrypted);
    let unlocked = other.unlock_note(&kept.id, "pw", false).unwrap();
    assert_eq!(unlocked.content, "<b>body</b>");
}

#[test]
fn import_rejects_malformed_payloads() {
    let (_, _, vault) = setup();
    vault.create_note("survivor", "", vec![]).unwrap();

    assert!(matches!(
        vault.import(r#"{"formatVersion":"1.0.0","notes":"nope"}"#),
        Err(VaultError::Validation { .. })
    ));
    assert_eq!(vault.list_notes().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lock_during_auto_save_stays_encrypted() {
    let (store, vault) = slow_setup();
    let note = vault.create_note("T", "fast", vec![]).unwrap();

    let mut edited = note.clone();
    edited.set_content("SLOW");
    vault.edit_note(edited).unwrap();
    // timer has fired and the write is sleeping inside the store
    tokio::time::sleep(Duration::from_millis(150)).await;

    vault.lock_note(&note.id, "pw").unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;

    let stored = store.get(&note.id).unwrap().unwrap();
    assert!(stored.is_encrypted);
    assert!(stored.content.is_empty());
    assert!(stored.encrypted_data.is_some());

    let unlocked = vault.unlock_note(&note.id, "pw", false).unwrap();
    assert_eq!(unlocked.content, "SLOW");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_during_auto_save_stays_deleted() {
    let (store, vault) = slow_setup();
    let note = vault.create_note("T", "fast", vec![]).unwrap();

    let mut edited = note.clone();
    edited.set_content("SLOW");
    vault.edit_note(edited).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(vault.delete_note(&note.id).unwrap());
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(store.get(&note.id).unwrap().is_none());
    assert!(vault.list_notes().is_empty());
}

#[test]
fn export_surfaces_store_failures() {
    let (store, _, vault) = setup();
    vault.create_note("A", "body", vec![]).unwrap();

    store.set_simulate_read_error(true);
    assert!(matches!(
        vault.export(serde_json::Value::Null),
        Err(VaultError::Storage { .. })
    ));
}

#[test]
fn locked_import_without_ciphertext_is_rejected() {
    let (_, _, vault) = setup();
    vault.create_note("survivor", "", vec![]).unwrap();

    let text = serde_json::json!({
        "formatVersion": "1.0.0",
        "exportDate": "2024-01-01T00:00:00Z",
        "notes": [{
            "id": "n1",
            "title": "T",
            "content": "plain secret",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
            "lastAccessedAt": "2024-01-01T00:00:00Z",
            "isEncrypted": true
        }]
    })
    .to_string();

    assert!(matches!(
        vault.import(&text),
        Err(VaultError::Validation { .. })
    ));
    let notes = vault.list_notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "survivor");
}

#[tokio::test(start_paused = true)]
async fn locked_note_hides_its_history() {
    let (_, _, vault) = setup();
    let note = vault.create_note("A", "secret v0", vec![]).unwrap();

    let mut edited = note.clone();
    edited.set_content("secret v1");
    vault.edit_note(edited).unwrap();
    vault.save_now(&note.id).unwrap();
    assert_eq!(vault.versions(&note.id).unwrap().unwrap().len(), 1);

    vault.lock_note(&note.id, "pw").unwrap();
    assert!(matches!(
        vault.versions(&note.id),
        Err(VaultError::NoteLocked { .. })
    ));

    vault.unlock_note(&note.id, "pw", false).unwrap();
    let versions = vault.versions(&note.id).unwrap().unwrap();
    assert_eq!(versions[0].content, "secret v0");
}
