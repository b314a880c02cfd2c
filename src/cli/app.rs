//! CLI module for the notevault application
//!
//! This module maps command-line subcommands onto the `NoteVault` engine.
use std::{
    fs::{read_to_string, write},
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};

use crate::{
    crypto, generate_password, load_note_from_file, parse_tags, score_password, Commands, Config,
    Note, NoteVault, PasswordAction, Result, VaultError,
};

/// CLI Application handler - processes CLI commands against the note vault
pub struct App {
    vault: Arc<NoteVault>,

    /// Effective configuration (after command line overrides)
    config: Config,

    /// Where `config --save` writes to
    config_path: Option<PathBuf>,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    pub fn new(
        vault: Arc<NoteVault>,
        config: Config,
        config_path: Option<PathBuf>,
        verbose: bool,
    ) -> Self {
        Self {
            vault,
            config,
            config_path,
            verbose,
        }
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Create {
                title,
                content,
                file,
                tags,
            } => self.create_note(title, content, file, tags)?,

            Commands::Show { id, json, password } => self.show_note(&id, json, password)?,

            Commands::List { tag, limit, json } => {
                let notes = match tag {
                    Some(tag) => self.vault.notes_by_tag(&tag),
                    None => self.vault.list_notes(),
                };
                self.display_notes(&limit_notes(notes, limit), json)?;
            }

            Commands::Search { query, limit, json } => {
                let results = limit_notes(self.vault.search(&query), limit);
                if results.is_empty() {
                    println!("No notes found matching query: \"{}\"", query);
                } else {
                    self.display_notes(&results, json)?;
                }
            }

            Commands::Edit {
                id,
                title,
                content,
                file,
                tags,
            } => self.edit_note(&id, title, content, file, tags).await?,

            Commands::Delete { id, force } => self.delete_note(&id, force)?,

            Commands::Pin { id } => {
                self.vault.set_pinned(&id, true)?;
                println!("Note {} pinned", id);
            }

            Commands::Unpin { id } => {
                self.vault.set_pinned(&id, false)?;
                println!("Note {} unpinned", id);
            }

            Commands::Lock { id, password } => {
                let strength = score_password(&password);
                if !strength.is_valid {
                    println!(
                        "{}",
                        console::style(format!(
                            "Warning: weak password (score {}/5)",
                            strength.score
                        ))
                        .yellow()
                    );
                }
                self.vault.lock_note(&id, &password)?;
                println!("Note {} locked", id);
            }

            Commands::Unlock { id, password } => {
                let note = self.vault.unlock_note(&id, &password, false)?;
                println!("Note '{}' ({}) unlocked", note.title, note.id);
            }

            Commands::Decrypt { id, password } => {
                self.vault.remove_encryption(&id, &password)?;
                println!("Encryption removed from note {}", id);
            }

            Commands::History { id } => self.show_history(&id)?,

            Commands::Restore { id, version_id } => {
                match self.vault.restore_version(&id, &version_id)? {
                    Some(note) => println!("Note '{}' restored to version {}", note.title, version_id),
                    None => {
                        return Err(VaultError::VersionNotFound {
                            note_id: id,
                            version_id,
                        })
                    }
                }
            }

            Commands::DeleteVersion { id, version_id } => {
                if !self.vault.delete_version(&id, &version_id)? {
                    return Err(VaultError::VersionNotFound {
                        note_id: id,
                        version_id,
                    });
                }
                println!("Version {} deleted", version_id);
            }

            Commands::ClearHistory { id } => {
                if !self.vault.clear_versions(&id)? {
                    return Err(VaultError::NoteNotFound { id });
                }
                println!("Version history of note {} cleared", id);
            }

            Commands::Export { output } => {
                let text = self.vault.export(serde_json::json!({}))?;
                write(&output, text)?;
                println!("Notes exported to {}", output.display());
            }

            Commands::Import { source, force } => self.import_bundle(&source, force)?,

            Commands::ImportNote { path } => {
                let mut note = load_note_from_file(&path)?;
                note.refresh_plain_text();
                self.vault.cache().save(&note)?;
                println!("Imported note with ID: {}", note.id);
            }

            Commands::Password { action } => match action {
                PasswordAction::Score { password } => {
                    let strength = score_password(&password);
                    let label = if strength.is_valid {
                        console::style("acceptable").green()
                    } else {
                        console::style("weak").red()
                    };
                    println!("Score: {}/5 ({})", strength.score, label);
                    for hint in strength.feedback {
                        println!("  - {}", hint);
                    }
                }
                PasswordAction::Generate { length } => println!("{}", generate_password(length)),
            },

            Commands::Config { save } => {
                println!("{}", serde_json::to_string_pretty(&self.config)?);
                if save {
                    let path = self
                        .config_path
                        .clone()
                        .or_else(Config::default_path)
                        .ok_or_else(|| VaultError::ConfigError {
                            message: "No configuration path available".to_string(),
                        })?;
                    self.config.save(&path)?;
                    println!("Configuration saved to {}", path.display());
                }
            }
        }

        Ok(())
    }

    fn create_note(
        &self,
        title: String,
        content: Option<String>,
        file: Option<PathBuf>,
        tags: Option<String>,
    ) -> Result<()> {
        let body = self.resolve_content(content, file)?.unwrap_or_default();
        let note = self.vault.create_note(&title, &body, parse_tags(tags))?;
        println!("Note created with ID: {}", note.id);
        Ok(())
    }

    /// Content from `--content` or `--file`, never both
    fn resolve_content(
        &self,
        content: Option<String>,
        file: Option<PathBuf>,
    ) -> Result<Option<String>> {
        match (content, file) {
            (Some(_), Some(_)) => Err(VaultError::Validation {
                message: "Cannot specify both --content and --file options".to_string(),
            }),
            (Some(content), None) => Ok(Some(content)),
            (None, Some(path)) => {
                debug!("Reading note content from {}", path.display());
                Ok(Some(read_to_string(path)?))
            }
            (None, None) => Ok(None),
        }
    }

    fn show_note(&self, id: &str, json: bool, password: Option<String>) -> Result<()> {
        let mut note = self
            .vault
            .get_note(id)
            .ok_or_else(|| VaultError::NoteNotFound { id: id.to_string() })?;

        if note.is_encrypted {
            match (password, &note.encrypted_data) {
                (Some(password), Some(envelope)) => {
                    // decrypt for display only; the stored note stays locked
                    let plaintext = crypto::unlock(envelope, &password)?;
                    note.title = plaintext.title;
                    note.set_content(plaintext.content);
                }
                _ => {
                    println!(
                        "{}",
                        console::style(format!("Note {} is locked. Use --password to view.", id))
                            .yellow()
                    );
                    return Ok(());
                }
            }
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&note)?);
            return Ok(());
        }

        println!("ID: {}", note.id);
        println!("Title: {}", console::style(&note.title).bold());
        println!(
            "Created: {} | Updated: {}",
            note.created_at.format("%Y-%m-%d %H:%M"),
            note.updated_at.format("%Y-%m-%d %H:%M")
        );
        if !note.tags.is_empty() {
            println!("Tags: {}", console::style(format_tags(&note.tags)).cyan());
        }
        println!("\n{}", note.content);
        Ok(())
    }

    async fn edit_note(
        &self,
        id: &str,
        title: Option<String>,
        content: Option<String>,
        file: Option<PathBuf>,
        tags: Option<String>,
    ) -> Result<()> {
        let mut note = self
            .vault
            .get_note(id)
            .ok_or_else(|| VaultError::NoteNotFound { id: id.to_string() })?;

        let content = self.resolve_content(content, file)?;
        if title.is_none() && content.is_none() && tags.is_none() {
            println!("Nothing to change.");
            return Ok(());
        }

        if let Some(title) = title {
            note.title = title;
        }
        if let Some(content) = content {
            note.set_content(content);
        }
        if tags.is_some() {
            note.tags = parse_tags(tags);
        }

        let delay = self.vault.edit_note(note)?;
        debug!("Auto-save scheduled in {:?}", delay);

        // a one-shot process cannot wait for the debounce window
        self.vault.save_now(id)?;
        info!("Note {} saved", id);
        println!("Note {} updated successfully", id);
        Ok(())
    }

    fn delete_note(&self, id: &str, force: bool) -> Result<()> {
        let note = self
            .vault
            .get_note(id)
            .ok_or_else(|| VaultError::NoteNotFound { id: id.to_string() })?;

        if !force {
            println!("You are about to delete the following note:");
            println!("ID:     {}", note.id);
            if note.is_encrypted {
                println!("Title:  {}", console::style("(locked)").dim());
            } else {
                println!("Title:  {}", note.title);
            }
            println!("Tags:   {}", note.tags.join(", "));
            println!("Created: {}", note.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!("Versions: {}", note.versions.len());

            if !confirm("Are you sure you want to delete this note?")? {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        self.vault.delete_note(id)?;
        println!("Note {} has been permanently deleted.", note.id);
        Ok(())
    }

    fn show_history(&self, id: &str) -> Result<()> {
        let versions = self
            .vault
            .versions(id)?
            .ok_or_else(|| VaultError::NoteNotFound { id: id.to_string() })?;

        if versions.is_empty() {
            println!("Note {} has no version history.", id);
            return Ok(());
        }

        for version in &versions {
            println!(
                "v{:<4} {}  {}  {}",
                version.version_number,
                version.timestamp.format("%Y-%m-%d %H:%M:%S"),
                console::style(&version.id).dim(),
                version.title
            );
            if self.verbose {
                println!("      {}", content_preview(&version.content, preview_width()));
            }
        }
        println!("\n{} versions", versions.len());
        Ok(())
    }

    fn import_bundle(&self, source: &Path, force: bool) -> Result<()> {
        let text = read_to_string(source)?;

        if !force {
            let existing = self.vault.list_notes().len();
            println!(
                "Importing {} replaces all {} existing notes.",
                source.display(),
                existing
            );
            if !confirm("Continue?")? {
                println!("Import cancelled.");
                return Ok(());
            }
        }

        let summary = self.vault.import(&text)?;
        println!("\nImport summary:");
        println!("  Format version: {}", summary.format_version);
        println!(
            "  Exported at:    {}",
            summary.exported_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("  Notes imported: {}", summary.notes_imported);
        Ok(())
    }

    fn display_notes(&self, notes: &[Note], json: bool) -> Result<()> {
        if notes.is_empty() {
            println!("No notes found matching the criteria.");
            return Ok(());
        }

        if json {
            let simplified: Vec<serde_json::Value> = notes
                .iter()
                .map(|note| {
                    serde_json::json!({
                        "id": note.id,
                        "title": note.title,
                        "isPinned": note.is_pinned,
                        "isEncrypted": note.is_encrypted,
                        "updatedAt": note.updated_at.to_rfc3339(),
                        "tags": note.tags,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&simplified)?);
            return Ok(());
        }

        let width = preview_width();
        for (i, note) in notes.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(width.min(50)));
            }

            let marker = if note.is_pinned { "* " } else { "" };
            println!(
                "{}ID: {} | Updated: {}",
                marker,
                note.id,
                note.updated_at.format("%Y-%m-%d %H:%M")
            );

            if note.is_encrypted {
                println!("Title: {}", console::style("(locked)").dim());
                continue;
            }
            println!("Title: {}", console::style(&note.title).bold());
            if !note.tags.is_empty() {
                println!("Tags: {}", console::style(format_tags(&note.tags)).cyan());
            }
            let preview = content_preview(&note.plain_text_content, width);
            if !preview.is_empty() {
                println!("\n{}", preview);
            }
        }

        println!(
            "\nFound {} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }
}

fn limit_notes(notes: Vec<Note>, limit: usize) -> Vec<Note> {
    if limit > 0 {
        notes.into_iter().take(limit).collect()
    } else {
        notes
    }
}

fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ")
}

fn preview_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

/// First `max_chars` characters of plain text, on one line
fn content_preview(text: &str, max_chars: usize) -> String {
    let line: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= max_chars {
        line
    } else {
        let cut: String = line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    stdout().flush()?;

    let mut input = String::new();
    stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
