//! Note storage and security engine
//!
//! This library caches notes over a persistent document store, encrypts
//! individual notes with a password, keeps an append-only version history
//! per note and coalesces editor changes into debounced durable writes.

mod bundle;
mod cache;
mod cli;
mod clock;
mod config;
mod coordinator;
pub mod crypto;
mod errors;
mod helper;
mod history;
mod memory_store;
mod note;
mod password;
mod session;
mod storage;
mod types;
mod vault;

// Re-export key components
pub use bundle::*;
pub use cache::*;
pub use cli::*;
pub use clock::*;
pub use config::*;
pub use coordinator::*;
pub use crypto::DecryptedNote;
pub use errors::*;
pub use helper::*;
pub use history::*;
pub use memory_store::*;
pub use note::*;
pub use password::*;
pub use session::*;
pub use storage::*;
pub use types::*;
pub use vault::*;
