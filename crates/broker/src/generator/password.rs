//! Password generation
//!
//! Passwords are built from lower-case letters (plus upper-case ones when
//! allowed), then the requested number of digits and symbols is inserted at
//! random positions. Symbols are restricted to a mostly shell-safe set.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lower-case letters
pub const LOWER_LETTERS: &str = "abcdefghijklmnopqrstuvwxyz";
/// Upper-case letters
pub const UPPER_LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// Decimal digits
pub const DIGITS: &str = "0123456789";
/// Symbols that survive unquoted in most shells
pub const SYMBOLS: &str = "_&^%$#@!";

/// Shape of a generated password
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordSpec {
    /// Total length
    pub length: usize,
    /// Number of digits
    pub num_digits: usize,
    /// Number of symbols
    pub num_symbols: usize,
    /// Mix in upper-case letters
    pub allow_upper: bool,
    /// Allow a character to appear more than once
    pub allow_repeat: bool,
}

impl Default for PasswordSpec {
    fn default() -> Self {
        Self {
            length: 32,
            num_digits: 4,
            num_symbols: 4,
            allow_upper: true,
            allow_repeat: true,
        }
    }
}

/// Why a [`PasswordSpec`] cannot be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PasswordError {
    /// Digits and symbols do not fit in the requested length
    #[error("number of digits and symbols must be less than total length")]
    ExceedsTotalLength,
    /// Too many letters for a password without repeats
    #[error("number of letters exceeds available letters and repeats are not allowed")]
    LettersExceedsAvailable,
    /// Too many digits for a password without repeats
    #[error("number of digits exceeds available digits and repeats are not allowed")]
    DigitsExceedsAvailable,
    /// Too many symbols for a password without repeats
    #[error("number of symbols exceeds available symbols and repeats are not allowed")]
    SymbolsExceedsAvailable,
}

/// Generate a password with the thread-local RNG
pub fn generate_password(spec: &PasswordSpec) -> Result<String, PasswordError> {
    generate_with(&mut rand::rng(), spec)
}

/// Generate a password with the given RNG
pub fn generate_with<R: Rng + ?Sized>(
    rng: &mut R,
    spec: &PasswordSpec,
) -> Result<String, PasswordError> {
    let letters: Vec<char> = if spec.allow_upper {
        LOWER_LETTERS.chars().chain(UPPER_LETTERS.chars()).collect()
    } else {
        LOWER_LETTERS.chars().collect()
    };
    let digits: Vec<char> = DIGITS.chars().collect();
    let symbols: Vec<char> = SYMBOLS.chars().collect();

    let num_letters = spec
        .length
        .checked_sub(spec.num_digits + spec.num_symbols)
        .ok_or(PasswordError::ExceedsTotalLength)?;

    if !spec.allow_repeat {
        if num_letters > letters.len() {
            return Err(PasswordError::LettersExceedsAvailable);
        }
        if spec.num_digits > digits.len() {
            return Err(PasswordError::DigitsExceedsAvailable);
        }
        if spec.num_symbols > symbols.len() {
            return Err(PasswordError::SymbolsExceedsAvailable);
        }
    }

    let mut out: Vec<char> = Vec::with_capacity(spec.length);
    while out.len() < num_letters {
        let c = pick(rng, &letters);
        if spec.allow_repeat || !out.contains(&c) {
            out.push(c);
        }
    }
    insert_random(rng, &mut out, &digits, spec.num_digits, spec.allow_repeat);
    insert_random(rng, &mut out, &symbols, spec.num_symbols, spec.allow_repeat);

    Ok(out.into_iter().collect())
}

fn pick<R: Rng + ?Sized>(rng: &mut R, alphabet: &[char]) -> char {
    alphabet[rng.random_range(0..alphabet.len())]
}

fn insert_random<R: Rng + ?Sized>(
    rng: &mut R,
    out: &mut Vec<char>,
    alphabet: &[char],
    count: usize,
    allow_repeat: bool,
) {
    let mut inserted = 0;
    while inserted < count {
        let c = pick(rng, alphabet);
        if !allow_repeat && out.contains(&c) {
            continue;
        }
        let at = rng.random_range(0..=out.len());
        out.insert(at, c);
        inserted += 1;
    }
}

/// Random opaque token, used when a spec cannot be satisfied
pub fn opaque_token() -> String {
    Uuid::new_v4().to_string()
}
