//! Error types for the notevault engine.
//!
//! This module defines the error taxonomy shared by the store, the caches,
//! the encryption engine and the write coordinator.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the notevault engine.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Note was not found when performing an operation that needs one.
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// Version was not found on an existing note.
    #[error("Version {version_id} not found on note {note_id}")]
    VersionNotFound { note_id: String, version_id: String },

    /// Persistent store failure.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Wrong password or tampered ciphertext.
    #[error("invalid password")]
    Decryption,

    /// Cipher setup or sealing failed.
    #[error("Encryption failed: {message}")]
    Encryption { message: String },

    /// The note is locked and its plaintext is not available.
    #[error("Note is locked: {id}")]
    NoteLocked { id: String },

    /// The note is not locked.
    #[error("Note is not locked: {id}")]
    NotLocked { id: String },

    /// Malformed import payload or unsafe record.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// An async operation was started outside a tokio runtime.
    #[error("Runtime error: {message}")]
    Runtime { message: String },

    /// for mutex lock acquisition issues
    #[error("{message}")]
    LockAcquisitionFailed { message: String },
}

impl VaultError {
    pub(crate) fn poisoned(what: &str) -> Self {
        VaultError::LockAcquisitionFailed {
            message: format!("Failed to acquire lock on {}", what),
        }
    }
}
