//! Attribute name validation.
//!
//! # Invariants
//! - Reserved words are matched case-insensitively.
//! - Names ending in `_id`/`_ids` are refused; those columns belong to
//!   object relations.
//! - Accepted names are lowercase identifiers usable as column names.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static NAME_FORMAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid name format regex"));
static REFERENCE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)_ids?$").expect("valid reference suffix regex"));

/// Longest accepted attribute name.
pub const MAX_NAME_LENGTH: usize = 64;

/// Words that collide with storage keywords, object methods, or search
/// index fields.
pub const RESERVED_WORDS: &[&str] = &[
    "attribute",
    "destroy",
    "true",
    "false",
    "integer",
    "select",
    "drop",
    "create",
    "alter",
    "index",
    "table",
    "varchar",
    "blob",
    "date",
    "datetime",
    "timestamp",
    "url",
    "icon",
    "initials",
    "avatar",
    "permission",
    "validate",
    "subscribe",
    "unsubscribe",
    "translate",
    "search",
    "_type",
    "_doc",
    "_id",
    "id",
];

/// Name validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    Empty,
    /// Carries the word exactly as submitted.
    ReservedWord(String),
    ReferenceSuffix(String),
    InvalidFormat(String),
    TooLong { name: String, max: usize },
}

impl Display for NameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Name can't be blank"),
            Self::ReservedWord(word) => {
                write!(f, "{word} is a reserved word, please choose a different one")
            }
            Self::ReferenceSuffix(_) => {
                write!(f, "Name can't get used, *_id and *_ids are not allowed")
            }
            Self::InvalidFormat(name) => write!(
                f,
                "Name `{name}` must start with a lowercase letter and contain only a-z, 0-9 and _"
            ),
            Self::TooLong { name, max } => {
                write!(f, "Name `{name}` is longer than {max} characters")
            }
        }
    }
}

impl Error for NameError {}

/// Validates one attribute name. Pure; no side effects.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if is_reserved_word(name) {
        return Err(NameError::ReservedWord(name.to_string()));
    }
    if REFERENCE_SUFFIX_RE.is_match(name) {
        return Err(NameError::ReferenceSuffix(name.to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(NameError::TooLong {
            name: name.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }
    if !NAME_FORMAT_RE.is_match(name) {
        return Err(NameError::InvalidFormat(name.to_string()));
    }
    Ok(())
}

pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS
        .iter()
        .any(|word| word.eq_ignore_ascii_case(name))
}
