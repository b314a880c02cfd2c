use std::{collections::HashMap, sync::Mutex};

use log::debug;

/// Passwords entered during this session, keyed by note id.
///
/// Lives only in process memory and is never written to a store.
#[derive(Default)]
pub struct SessionPasswords {
    passwords: Mutex<HashMap<String, String>>,
}

impl SessionPasswords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, note_id: &str, password: &str) {
        if let Ok(mut passwords) = self.passwords.lock() {
            passwords.insert(note_id.to_string(), password.to_string());
            debug!("Remembered session password for note {}", note_id);
        }
    }

    pub fn get(&self, note_id: &str) -> Option<String> {
        self.passwords
            .lock()
            .ok()
            .and_then(|passwords| passwords.get(note_id).cloned())
    }

    pub fn clear(&self, note_id: &str) {
        if let Ok(mut passwords) = self.passwords.lock() {
            passwords.remove(note_id);
        }
    }

    pub fn clear_all(&self) {
        if let Ok(mut passwords) = self.passwords.lock() {
            passwords.clear();
            debug!("Cleared all session passwords");
        }
    }
}

impl std::fmt::Debug for SessionPasswords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.passwords.lock().map(|p| p.len()).unwrap_or(0);
        f.debug_struct("SessionPasswords")
            .field("remembered", &count)
            .finish()
    }
}
