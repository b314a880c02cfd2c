//! Export/import bundle: the whole note set as one JSON text blob.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{storage::validate_note_id, Note, Result, VaultError};

pub const EXPORT_FORMAT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub format_version: String,
    pub export_date: DateTime<Utc>,
    pub notes: Vec<Note>,
    /// Opaque UI preferences carried alongside the notes
    #[serde(default)]
    pub preferences: serde_json::Value,
}

impl ExportBundle {
    pub fn new(notes: Vec<Note>, preferences: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            format_version: EXPORT_FORMAT_VERSION.to_string(),
            export_date: now,
            notes,
            preferences,
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and validates an exported blob.
    ///
    /// Rejects anything that is not a JSON object with a `notes` list, and
    /// any note with an unsafe or duplicate id or a locked note without
    /// ciphertext. Every imported note gets its plain text recomputed;
    /// locked notes have their plaintext fields cleared.
    pub fn from_text(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| VaultError::Validation {
                message: format!("Import payload is not valid JSON: {}", e),
            })?;

        let Some(object) = value.as_object() else {
            return Err(VaultError::Validation {
                message: "Import payload must be a JSON object".to_string(),
            });
        };
        match object.get("notes") {
            Some(serde_json::Value::Array(_)) => {}
            _ => {
                return Err(VaultError::Validation {
                    message: "Import payload has no notes list".to_string(),
                })
            }
        }

        let mut bundle: ExportBundle =
            serde_json::from_value(value).map_err(|e| VaultError::Validation {
                message: format!("Import payload has malformed notes: {}", e),
            })?;

        if bundle.format_version != EXPORT_FORMAT_VERSION {
            warn!(
                "Importing bundle with format version {} (expected {})",
                bundle.format_version, EXPORT_FORMAT_VERSION
            );
        }
        let mut seen = HashSet::new();
        for note in &mut bundle.notes {
            validate_note_id(&note.id)?;
            if !seen.insert(note.id.clone()) {
                return Err(VaultError::Validation {
                    message: format!("Import payload repeats note id {}", note.id),
                });
            }

            if note.is_encrypted {
                let Some(envelope) = note.encrypted_data.take() else {
                    return Err(VaultError::Validation {
                        message: format!("Locked note {} has no encrypted data", note.id),
                    });
                };
                note.seal(envelope);
            } else {
                note.refresh_plain_text();
            }
        }
        debug!("Parsed import bundle with {} notes", bundle.notes.len());
        Ok(bundle)
    }
}
