use async_trait::async_trait;
use rand::{seq::IndexedRandom, Rng};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{parse_args, EntryPoint, Parameters, UnitError};

pub const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";
const MAX_PASSWORD_LENGTH: i64 = 4096;

const WORDS: &[&str] = &[
    "apple", "banana", "cherry", "dragon", "elephant", "forest", "guitar", "hammer", "island",
    "jungle", "kitten", "lemon", "mountain", "ocean", "piano", "queen", "rabbit", "sunset", "tiger",
    "umbrella", "violin", "whale", "xylophone", "yellow", "zebra",
];

fn default_length() -> i64 {
    12
}

fn default_word_count() -> i64 {
    4
}

fn default_separator() -> String {
    "-".to_string()
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PasswordArgs {
    #[serde(default = "default_length")]
    length: i64,
    #[serde(default = "enabled")]
    include_symbols: bool,
    #[serde(default = "enabled")]
    include_numbers: bool,
    #[serde(default = "enabled")]
    include_uppercase: bool,
    #[serde(default = "enabled")]
    include_lowercase: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemorableArgs {
    #[serde(default = "default_word_count")]
    word_count: i64,
    #[serde(default = "default_separator")]
    separator: String,
}

pub struct GeneratePassword;

#[async_trait]
impl EntryPoint for GeneratePassword {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError> {
        generate_password(parse_args(params)?)
    }
}

pub struct GenerateMemorablePassword;

#[async_trait]
impl EntryPoint for GenerateMemorablePassword {
    async fn call(&self, params: Parameters) -> Result<Value, UnitError> {
        generate_memorable_password(parse_args(params)?)
    }
}

fn generate_password(args: PasswordArgs) -> Result<Value, UnitError> {
    if args.length < 1 {
        return Err(UnitError::failed("Password length must be at least 1"));
    }
    if args.length > MAX_PASSWORD_LENGTH {
        return Err(UnitError::failed(format!(
            "Password length must be at most {MAX_PASSWORD_LENGTH}"
        )));
    }

    let mut characters: Vec<char> = Vec::new();
    if args.include_lowercase {
        characters.extend('a'..='z');
    }
    if args.include_uppercase {
        characters.extend('A'..='Z');
    }
    if args.include_numbers {
        characters.extend('0'..='9');
    }
    if args.include_symbols {
        characters.extend(SYMBOLS.chars());
    }
    if characters.is_empty() {
        return Err(UnitError::failed(
            "At least one character type must be selected",
        ));
    }

    let mut rng = rand::rng();
    let password: String = (0..args.length)
        .map(|_| characters[rng.random_range(0..characters.len())])
        .collect();
    let strength = password_strength(&password);

    Ok(json!({
        "password": password,
        "length": args.length,
        "strength": strength,
        "character_types": {
            "lowercase": args.include_lowercase,
            "uppercase": args.include_uppercase,
            "numbers": args.include_numbers,
            "symbols": args.include_symbols,
        },
    }))
}

fn generate_memorable_password(args: MemorableArgs) -> Result<Value, UnitError> {
    if args.word_count < 1 {
        return Err(UnitError::failed("Word count must be at least 1"));
    }
    let count = usize::try_from(args.word_count)
        .unwrap_or(usize::MAX)
        .min(WORDS.len());

    let mut rng = rand::rng();
    let words: Vec<&str> = WORDS.choose_multiple(&mut rng, count).copied().collect();
    let suffix: u8 = rng.random_range(10..100);
    let password = format!("{}{suffix}", words.join(&args.separator));

    Ok(json!({
        "password": password,
        "words": words,
        "type": "memorable",
    }))
}

/// Scores length and character variety, one point each.
pub fn password_strength(password: &str) -> &'static str {
    let length = password.chars().count();
    let checks = [
        length >= 8,
        length >= 12,
        length >= 16,
        password.chars().any(|c| c.is_lowercase()),
        password.chars().any(|c| c.is_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| SYMBOLS.contains(c)),
    ];
    match checks.iter().filter(|&&passed| passed).count() {
        6.. => "Very Strong",
        4..=5 => "Strong",
        3 => "Medium",
        _ => "Weak",
    }
}

#[cfg(test)]
#[path = "tests/password_tests.rs"]
mod tests;
