//! Password-based encryption of a note's title and content.
//!
//! Key: PBKDF2-HMAC-SHA256 over a fresh 128-bit salt per lock, 10,000
//! iterations, 256-bit output. Cipher: AES-256-GCM with a random 96-bit
//! nonce per field. Each field is stored as `base64(nonce || ciphertext)`.
//! A wrong password fails tag verification and surfaces as
//! [`VaultError::Decryption`].

use aes_gcm::{
    aead::{consts::U12, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, warn};
use rand::Rng;
use sha2::Sha256;

use crate::{EncryptedEnvelope, Result, VaultError};

pub const PBKDF2_ITERATIONS: u32 = 10_000;
pub const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Plaintext recovered from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedNote {
    pub title: String,
    pub content: String,
}

/// Encrypts `title` and `content` under a key derived from `password`.
///
/// The caller is responsible for clearing the note's plaintext fields.
pub fn lock(title: &str, content: &str, password: &str) -> Result<EncryptedEnvelope> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt);

    let cipher = cipher_for(password, &salt)?;
    let envelope = EncryptedEnvelope {
        cipher_title: seal_field(&cipher, title)?,
        cipher_content: seal_field(&cipher, content)?,
        salt: hex::encode(salt),
    };
    debug!("Sealed note envelope ({} content bytes)", content.len());
    Ok(envelope)
}

/// Decrypts both fields of `envelope` with `password`.
pub fn unlock(envelope: &EncryptedEnvelope, password: &str) -> Result<DecryptedNote> {
    let salt = hex::decode(&envelope.salt).map_err(|e| {
        warn!("Envelope salt is not valid hex: {}", e);
        VaultError::Decryption
    })?;

    let cipher = cipher_for(password, &salt)?;
    Ok(DecryptedNote {
        title: open_field(&cipher, &envelope.cipher_title)?,
        content: open_field(&cipher, &envelope.cipher_content)?,
    })
}

/// Whether `password` opens `envelope`.
pub fn verify(envelope: &EncryptedEnvelope, password: &str) -> bool {
    unlock(envelope, password).is_ok()
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

fn cipher_for(password: &str, salt: &[u8]) -> Result<Aes256Gcm> {
    let key = derive_key(password, salt);
    Aes256Gcm::new_from_slice(&key).map_err(|e| VaultError::Encryption {
        message: e.to_string(),
    })
}

fn seal_field(cipher: &Aes256Gcm, plaintext: &str) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::<U12>::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| VaultError::Encryption {
            message: e.to_string(),
        })?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(sealed))
}

fn open_field(cipher: &Aes256Gcm, sealed: &str) -> Result<String> {
    let raw = STANDARD.decode(sealed).map_err(|_| VaultError::Decryption)?;
    if raw.len() < NONCE_LEN {
        return Err(VaultError::Decryption);
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);

    let plaintext = cipher
        .decrypt(Nonce::<U12>::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::Decryption)?;
    String::from_utf8(plaintext).map_err(|_| VaultError::Decryption)
}
