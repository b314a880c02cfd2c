//! Shared types for the notevault engine and its command line front end.
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Subcommand;

use crate::VaultError;

/// A specialized Result type for notevault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Summary of an import operation
#[derive(Debug, Clone)]
pub struct ImportSummary {
    /// Number of notes now in the vault
    pub notes_imported: usize,
    /// Format version recorded in the bundle
    pub format_version: String,
    /// When the bundle was exported
    pub exported_at: DateTime<Utc>,
    /// Opaque preferences carried by the bundle
    pub preferences: serde_json::Value,
}

/// Available subcommands for the notevault application
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    Create {
        /// Title of the note
        #[clap(short = 'T', long)]
        title: String,

        /// Content of the note (markdown or HTML)
        #[clap(short, long)]
        content: Option<String>,

        /// Path to a file containing the note's content
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Tags to associate with the note (comma-separated)
        #[clap(short = 't', long)]
        tags: Option<String>,
    },

    /// Show a note by ID
    Show {
        /// ID of the note to show
        id: String,

        /// Format output as raw JSON
        #[clap(short, long)]
        json: bool,

        /// Password for a locked note
        #[clap(short, long)]
        password: Option<String>,
    },

    /// List notes, pinned first
    List {
        /// Filter notes by tag
        #[clap(short, long)]
        tag: Option<String>,

        /// Limit the number of notes returned (0 for no limit)
        #[clap(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Fuzzy search over titles and plain text
    Search {
        /// Search query text
        query: String,

        /// Limit the number of search results (0 for no limit)
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Edit an existing note through the auto-save coordinator
    Edit {
        /// ID of the note to edit
        id: String,

        /// New title for the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// New content for the note
        #[clap(short, long)]
        content: Option<String>,

        /// Path to a file containing the new note content
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Replace the note's tags (comma-separated)
        #[clap(short = 't', long)]
        tags: Option<String>,
    },

    /// Delete a note by ID
    Delete {
        /// ID of the note to delete
        id: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Pin a note to the top of the list
    Pin {
        /// ID of the note to pin
        id: String,
    },

    /// Unpin a note
    Unpin {
        /// ID of the note to unpin
        id: String,
    },

    /// Encrypt a note with a password
    Lock {
        /// ID of the note to lock
        id: String,

        /// Password to lock with
        #[clap(short, long)]
        password: String,
    },

    /// Decrypt a locked note
    Unlock {
        /// ID of the note to unlock
        id: String,

        /// Password the note was locked with
        #[clap(short, long)]
        password: String,
    },

    /// Remove encryption from a note for good
    Decrypt {
        /// ID of the note
        id: String,

        /// Password the note was locked with
        #[clap(short, long)]
        password: String,
    },

    /// List the version history of a note
    History {
        /// ID of the note
        id: String,
    },

    /// Restore a note to an earlier version
    Restore {
        /// ID of the note
        id: String,

        /// ID of the version to restore
        version_id: String,
    },

    /// Delete one version from a note's history
    DeleteVersion {
        /// ID of the note
        id: String,

        /// ID of the version to delete
        version_id: String,
    },

    /// Clear a note's version history
    ClearHistory {
        /// ID of the note
        id: String,
    },

    /// Export every note to a single JSON file
    Export {
        /// Path of the export file
        #[clap(short, long)]
        output: PathBuf,
    },

    /// Replace all notes with the contents of an export file
    Import {
        /// Path of the export file
        source: PathBuf,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Load a single note from its JSON record
    ImportNote {
        /// Path to a note JSON file
        path: PathBuf,
    },

    /// Password utilities
    Password {
        #[clap(subcommand)]
        action: PasswordAction,
    },

    /// Configuration management
    Config {
        /// Write the effective configuration to the config file
        #[clap(short, long)]
        save: bool,
    },
}

#[derive(Subcommand)]
pub enum PasswordAction {
    /// Score a password's strength
    Score {
        /// Password to score
        password: String,
    },

    /// Generate a random password
    Generate {
        /// Length of the password
        #[clap(short, long, default_value_t = crate::DEFAULT_PASSWORD_LENGTH)]
        length: usize,
    },
}
