//! Core data structures for the notevault engine.
//!
//! This module contains the persisted record shapes: the note itself, its
//! version snapshots and the ciphertext envelope of a locked note.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::derive_plain_text;

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier for the note
    pub id: String,
    /// Note title
    pub title: String,
    /// Note content as produced by the editor (HTML or Markdown)
    pub content: String,
    /// Text-only projection of `content`, used for search
    #[serde(default)]
    pub plain_text_content: String,
    #[serde(default)]
    pub is_pinned: bool,
    /// True only while the note is locked
    #[serde(default)]
    pub is_encrypted: bool,
    /// Sticky once the note has been locked at least once
    #[serde(default)]
    pub has_been_encrypted: bool,
    /// Ciphertext on record, if any
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_envelope"
    )]
    pub encrypted_data: Option<EncryptedEnvelope>,
    /// Tags for organization
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the note was created
    pub created_at: DateTime<Utc>,
    /// Last persisted modification time
    pub updated_at: DateTime<Utc>,
    /// Last time the note was opened
    pub last_accessed_at: DateTime<Utc>,
    /// Running count of snapshots taken
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub versions: Vec<NoteVersion>,
    /// Opaque payload from the AI collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_metadata: Option<serde_json::Value>,
}

impl Note {
    /// Creates a new note with the given title and content
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        tags: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut note = Note {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            plain_text_content: String::new(),
            is_pinned: false,
            is_encrypted: false,
            has_been_encrypted: false,
            encrypted_data: None,
            tags,
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            version: 0,
            versions: Vec::new(),
            ai_metadata: None,
        };
        note.refresh_plain_text();
        note
    }

    /// Replaces the content and recomputes the plain text projection.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.refresh_plain_text();
    }

    pub fn refresh_plain_text(&mut self) {
        self.plain_text_content = derive_plain_text(&self.content);
    }

    /// Whether the title or content differ from the given state.
    pub fn differs_from(&self, title: &str, content: &str) -> bool {
        self.title != title || self.content != content
    }

    pub fn find_version(&self, version_id: &str) -> Option<&NoteVersion> {
        self.versions.iter().find(|v| v.id == version_id)
    }

    /// The number the next snapshot will carry.
    ///
    /// Continues from the highest number ever handed out, so numbers are
    /// never reused while the counter is alive.
    pub fn next_version_number(&self) -> u32 {
        let max_existing = self
            .versions
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0);
        max_existing.max(self.version) + 1
    }

    /// Appends a snapshot of `title`/`content` and bumps the counter.
    pub fn push_snapshot(&mut self, title: &str, content: &str, now: DateTime<Utc>) -> NoteVersion {
        let version = NoteVersion {
            id: Uuid::new_v4().to_string(),
            note_id: self.id.clone(),
            title: title.to_string(),
            content: content.to_string(),
            timestamp: now,
            version_number: self.next_version_number(),
        };
        self.version = version.version_number;
        self.versions.push(version.clone());
        version
    }

    /// Replaces the plaintext with ciphertext and marks the note locked.
    pub(crate) fn seal(&mut self, envelope: EncryptedEnvelope) {
        self.title.clear();
        self.content.clear();
        self.plain_text_content.clear();
        self.encrypted_data = Some(envelope);
        self.is_encrypted = true;
        self.has_been_encrypted = true;
    }

    /// Puts decrypted plaintext back into the live fields.
    pub(crate) fn reveal(&mut self, title: String, content: String) {
        self.title = title;
        self.set_content(content);
        self.is_encrypted = false;
    }
}

/// Immutable snapshot of a note taken before an edit overwrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteVersion {
    pub id: String,
    pub note_id: String,
    pub title: String,
    /// Content before the triggering edit
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// 1-based, strictly increasing per note
    pub version_number: u32,
}

/// Ciphertext bundle stored in place of a locked note's plaintext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub cipher_title: String,
    pub cipher_content: String,
    /// Hex-encoded 128-bit salt
    pub salt: String,
}

/// Older records carry the envelope as a JSON-encoded string.
fn deserialize_envelope<'de, D>(deserializer: D) -> Result<Option<EncryptedEnvelope>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum EnvelopeField {
        Object(EncryptedEnvelope),
        Encoded(String),
    }

    match Option::<EnvelopeField>::deserialize(deserializer)? {
        None => Ok(None),
        Some(EnvelopeField::Object(envelope)) => Ok(Some(envelope)),
        Some(EnvelopeField::Encoded(raw)) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
