use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, error, info, trace, warn};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{load_note_from_file, Note, Result, VaultError};

/// Durable document table keyed by note id.
///
/// Implementations are the only place that touches durable state; the
/// caches above them assume a single writer.
pub trait NoteStore: Send + Sync {
    /// Returns `Ok(None)` when the id is absent; `Err` only on I/O failure.
    fn get(&self, id: &str) -> Result<Option<Note>>;

    fn put(&self, note: &Note) -> Result<()>;

    /// Deleting an absent id is not an error.
    fn delete(&self, id: &str) -> Result<()>;

    fn scan(&self) -> Result<Vec<Note>>;

    fn bulk_put(&self, notes: &[Note]) -> Result<()> {
        for note in notes {
            self.put(note)?;
        }
        Ok(())
    }

    fn bulk_delete(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.delete(id)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let ids: Vec<String> = self.scan()?.into_iter().map(|n| n.id).collect();
        self.bulk_delete(&ids)
    }
}

/// Rejects ids that would escape the notes directory.
pub(crate) fn validate_note_id(id: &str) -> Result<()> {
    let safe = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        Ok(())
    } else {
        Err(VaultError::Validation {
            message: format!("Unsafe note id: {:?}", id),
        })
    }
}

/// Stores each note as a JSON document on disk.
///
/// Layout: `notes_dir/<first 2 chars of id>/<id>.json`.
pub struct JsonFileStore {
    notes_dir: PathBuf,
}

impl JsonFileStore {
    /// Opens (and creates if needed) a store rooted at `notes_dir`.
    pub fn open(notes_dir: impl Into<PathBuf>) -> Result<Self> {
        let notes_dir = notes_dir.into();
        if !notes_dir.exists() {
            debug!(
                "Notes directory does not exist, creating: {}",
                notes_dir.display()
            );
            fs::create_dir_all(&notes_dir).map_err(|e| {
                error!("Failed to create notes directory: {}", e);
                VaultError::DirectoryError {
                    path: notes_dir.clone(),
                }
            })?;
        }
        info!("Opened note store at {}", notes_dir.display());
        Ok(Self { notes_dir })
    }

    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }

    /// `<notes_dir>/<shard>/<id>.json`, where the shard is the first two
    /// characters of the id.
    fn note_path(&self, note_id: &str) -> PathBuf {
        let shard: String = note_id.chars().take(2).collect();
        self.notes_dir.join(shard).join(format!("{}.json", note_id))
    }

    /// Removes `dir` and its ancestors while they are empty, stopping at
    /// the notes root.
    fn prune_empty_dirs(&self, dir: &Path) {
        let mut current = Some(dir);
        while let Some(dir) = current {
            if dir == self.notes_dir || !dir.starts_with(&self.notes_dir) {
                break;
            }
            let empty = match fs::read_dir(dir) {
                Ok(mut entries) => entries.next().is_none(),
                Err(e) => {
                    warn!("Cannot inspect shard {}: {}", dir.display(), e);
                    break;
                }
            };
            if !empty {
                break;
            }
            if let Err(e) = fs::remove_dir(dir) {
                warn!("Cannot remove empty shard {}: {}", dir.display(), e);
                break;
            }
            debug!("Removed empty shard {}", dir.display());
            current = dir.parent();
        }
    }
}

impl NoteStore for JsonFileStore {
    fn get(&self, id: &str) -> Result<Option<Note>> {
        validate_note_id(id)?;
        let file_path = self.note_path(id);
        if !file_path.exists() {
            trace!("No note file for {}", id);
            return Ok(None);
        }
        load_note_from_file(&file_path).map(Some)
    }

    /// Writes the note atomically: temp file in the target directory, then rename.
    fn put(&self, note: &Note) -> Result<()> {
        validate_note_id(&note.id)?;
        let file_path = self.note_path(&note.id);
        debug!("Writing note {} to {}", note.id, file_path.display());

        let dir = match file_path.parent() {
            Some(parent) => parent,
            None => self.notes_dir.as_path(),
        };
        if !dir.exists() {
            debug!("Creating parent directory: {}", dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                error!("Failed to create directory {}: {}", dir.display(), e);
                VaultError::Io(e)
            })?;
        }

        let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
            error!("Failed to create temporary file: {}", e);
            VaultError::Io(e)
        })?;

        let json = serde_json::to_string_pretty(note).map_err(|e| {
            error!("Failed to serialize note: {}", e);
            VaultError::Serialization(e)
        })?;

        temp_file.write_all(json.as_bytes()).map_err(|e| {
            error!("Failed to write to temporary file: {}", e);
            VaultError::Io(e)
        })?;
        temp_file.flush().map_err(|e| {
            error!("Failed to flush temporary file: {}", e);
            VaultError::Io(e)
        })?;

        temp_file.persist(&file_path).map_err(|e| {
            error!(
                "Failed to persist file {}: {}",
                file_path.display(),
                e.error
            );
            VaultError::Io(e.error)
        })?;

        trace!("Note {} written", note.id);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        validate_note_id(id)?;
        let file_path = self.note_path(id);

        if !file_path.exists() {
            debug!("Note file doesn't exist on disk: {}", file_path.display());
            return Ok(());
        }

        fs::remove_file(&file_path).map_err(|e| {
            error!("Failed to delete note file {}: {}", file_path.display(), e);
            VaultError::Io(e)
        })?;
        debug!("Note file deleted: {}", file_path.display());

        if let Some(shard) = file_path.parent() {
            self.prune_empty_dirs(shard);
        }
        Ok(())
    }

    /// Loads every note on disk. Unreadable files are logged and skipped.
    fn scan(&self) -> Result<Vec<Note>> {
        if !self.notes_dir.exists() {
            return Err(VaultError::DirectoryError {
                path: self.notes_dir.clone(),
            });
        }

        let mut notes = Vec::new();
        let mut load_errors = 0usize;

        for entry in WalkDir::new(&self.notes_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                match load_note_from_file(path) {
                    Ok(note) => notes.push(note),
                    Err(e) => {
                        warn!("Failed to load note from {}: {}", path.display(), e);
                        load_errors += 1;
                    }
                }
            }
        }

        if load_errors > 0 {
            error!("Encountered {} errors while scanning notes", load_errors);
        }
        debug!("Scanned {} notes from {}", notes.len(), self.notes_dir.display());
        Ok(notes)
    }
}
