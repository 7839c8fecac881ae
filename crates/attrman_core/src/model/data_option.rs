//! Type-specific attribute settings.
//!
//! # Responsibility
//! - Hold the free-form `data_option` mapping of an attribute.
//! - Provide typed accessors for keys the engine interprets.
//!
//! # Invariants
//! - An absent key and an explicit `null` both count as "unset".
//! - Explicit `false` is a value, never treated as unset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const KEY_NULL: &str = "null";
pub const KEY_NULLOPTION: &str = "nulloption";
pub const KEY_MAXLENGTH: &str = "maxlength";
pub const KEY_OPTIONS: &str = "options";
pub const KEY_DEFAULT: &str = "default";
pub const KEY_MIN: &str = "min";
pub const KEY_MAX: &str = "max";

/// Mapping of option name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataOption(Map<String, Value>);

/// One selectable value of an enumeration attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumOption {
    pub value: String,
    pub label: String,
}

impl DataOption {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a JSON value, which must be an object or `null`.
    pub fn from_value(value: Value) -> Result<Self, DataOptionError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            _ => Err(DataOptionError::NotAnObject),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_unset(&self, key: &str) -> bool {
        matches!(self.0.get(key), None | Some(Value::Null))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Whether the backing column may hold NULL. Unset reads as `None`.
    pub fn null(&self) -> Option<bool> {
        self.0.get(KEY_NULL).and_then(Value::as_bool)
    }

    /// Whether forms offer an empty choice for enumerations.
    pub fn nulloption(&self) -> Option<bool> {
        self.0.get(KEY_NULLOPTION).and_then(Value::as_bool)
    }

    pub fn maxlength(&self) -> Option<u64> {
        self.0.get(KEY_MAXLENGTH).and_then(Value::as_u64)
    }

    /// Column default. `null` and the empty string mean "no default".
    pub fn default_value(&self) -> Option<&Value> {
        match self.0.get(KEY_DEFAULT) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) if text.is_empty() => None,
            Some(value) => Some(value),
        }
    }

    /// Flattens `options` into ordered value/label pairs.
    ///
    /// Accepts `{value: label}` objects and `[{value, name, children?}]`
    /// lists. Tree children are visited depth-first after their parent.
    /// Returns an empty list when `options` is unset.
    pub fn enum_options(&self) -> Result<Vec<EnumOption>, DataOptionError> {
        let mut collected = Vec::new();
        match self.0.get(KEY_OPTIONS) {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (value, label) in map {
                    let label = match label {
                        Value::String(text) => text.clone(),
                        Value::Null => value.clone(),
                        other => other.to_string(),
                    };
                    collected.push(EnumOption {
                        value: value.clone(),
                        label,
                    });
                }
            }
            Some(Value::Array(items)) => collect_option_list(items, &mut collected)?,
            Some(_) => {
                return Err(DataOptionError::InvalidOptions(
                    "`options` must be an object or a list".to_string(),
                ));
            }
        }

        for (index, option) in collected.iter().enumerate() {
            if collected[..index]
                .iter()
                .any(|previous| previous.value == option.value)
            {
                return Err(DataOptionError::InvalidOptions(format!(
                    "duplicate option value `{}`",
                    option.value
                )));
            }
        }
        Ok(collected)
    }
}

fn collect_option_list(
    items: &[Value],
    collected: &mut Vec<EnumOption>,
) -> Result<(), DataOptionError> {
    for item in items {
        let Value::Object(entry) = item else {
            return Err(DataOptionError::InvalidOptions(
                "list options must be objects with `value`".to_string(),
            ));
        };
        let value = match entry.get("value") {
            Some(Value::String(text)) if !text.is_empty() => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            _ => {
                return Err(DataOptionError::InvalidOptions(
                    "list option is missing a `value`".to_string(),
                ));
            }
        };
        let label = entry
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.clone());
        collected.push(EnumOption { value, label });

        match entry.get("children") {
            None | Some(Value::Null) => {}
            Some(Value::Array(children)) => collect_option_list(children, collected)?,
            Some(_) => {
                return Err(DataOptionError::InvalidOptions(
                    "`children` must be a list".to_string(),
                ));
            }
        }
    }
    Ok(())
}

impl From<Map<String, Value>> for DataOption {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Data option validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOptionError {
    NotAnObject,
    /// Enumeration type declared without any selectable value.
    MissingOptions(&'static str),
    InvalidOptions(String),
    InvalidMaxlength(String),
    InvalidRange { min: i64, max: i64 },
    InvalidDefault {
        data_type: &'static str,
        reason: &'static str,
    },
}

impl Display for DataOptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "data_option must be an object"),
            Self::MissingOptions(data_type) => {
                write!(f, "data_option.options is required for data_type `{data_type}`")
            }
            Self::InvalidOptions(reason) => write!(f, "invalid data_option.options: {reason}"),
            Self::InvalidMaxlength(value) => write!(
                f,
                "data_option.maxlength must be an integer between 1 and 65535, got `{value}`"
            ),
            Self::InvalidRange { min, max } => {
                write!(f, "data_option.min ({min}) must not exceed data_option.max ({max})")
            }
            Self::InvalidDefault { data_type, reason } => {
                write!(f, "invalid data_option.default for `{data_type}`: {reason}")
            }
        }
    }
}

impl Error for DataOptionError {}
