//! Password strength scoring and generation for the lock dialog.

use rand::{seq::SliceRandom, Rng};

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

pub const DEFAULT_PASSWORD_LENGTH: usize = 16;
const MIN_VALID_SCORE: u8 = 3;
const MAX_SCORE: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordStrength {
    /// 0 to 5
    pub score: u8,
    pub is_valid: bool,
    /// One hint per unmet criterion
    pub feedback: Vec<String>,
}

pub fn score_password(password: &str) -> PasswordStrength {
    let length = password.chars().count();
    let criteria = [
        (length >= 8, "Use at least 8 characters"),
        (length >= 12, "Use 12 or more characters for a stronger password"),
        (
            password.chars().any(|c| c.is_ascii_lowercase()),
            "Add lowercase letters",
        ),
        (
            password.chars().any(|c| c.is_ascii_uppercase()),
            "Add uppercase letters",
        ),
        (password.chars().any(|c| c.is_ascii_digit()), "Add numbers"),
        (
            password.chars().any(|c| !c.is_ascii_alphanumeric()),
            "Add symbols",
        ),
    ];

    let met = criteria.iter().filter(|(ok, _)| *ok).count() as u8;
    let score = met.min(MAX_SCORE);
    let feedback = criteria
        .iter()
        .filter(|(ok, _)| !ok)
        .map(|(_, hint)| hint.to_string())
        .collect();

    PasswordStrength {
        score,
        is_valid: score >= MIN_VALID_SCORE,
        feedback,
    }
}

/// Generates a password with at least one character of every class.
///
/// Lengths below 4 are raised to 4.
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::rng();
    let classes = [LOWERCASE, UPPERCASE, DIGITS, SYMBOLS];
    let alphabet: Vec<char> = classes.concat().chars().collect();
    let length = length.max(classes.len());

    let mut chars: Vec<char> = classes
        .iter()
        .map(|class| {
            let class: Vec<char> = class.chars().collect();
            class[rng.random_range(0..class.len())]
        })
        .collect();

    while chars.len() < length {
        chars.push(alphabet[rng.random_range(0..alphabet.len())]);
    }

    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}
