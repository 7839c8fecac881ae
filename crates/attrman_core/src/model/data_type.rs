//! Type registry: the closed catalog of attribute data types.
//!
//! # Responsibility
//! - Declare default data options per type.
//! - Decide which type transitions are allowed on an existing attribute.
//! - Map a type and its options onto a declared column type.
//!
//! # Invariants
//! - Default filling never overwrites a value that is explicitly set.
//! - Every allowed transition keeps existing column values readable.

use crate::model::data_option::{
    DataOption, DataOptionError, KEY_MAX, KEY_MAXLENGTH, KEY_MIN, KEY_NULL, KEY_NULLOPTION,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Column length used when an attribute does not declare `maxlength`.
pub const DEFAULT_MAXLENGTH: u64 = 255;
pub const MAX_MAXLENGTH: u64 = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Textarea,
    Richtext,
    Select,
    TreeSelect,
    Checkbox,
    Boolean,
    Integer,
    Date,
    Datetime,
}

/// Declared storage type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Varchar(u64),
    Text,
    Boolean,
    Integer,
    Date,
    Timestamp,
}

impl StorageType {
    /// Type name as written into `ALTER TABLE` and read back by `table_info`.
    pub fn sql(self) -> String {
        match self {
            Self::Varchar(length) => format!("VARCHAR({length})"),
            Self::Text => "TEXT".to_string(),
            Self::Boolean => "BOOLEAN".to_string(),
            Self::Integer => "INTEGER".to_string(),
            Self::Date => "DATE".to_string(),
            Self::Timestamp => "TIMESTAMP".to_string(),
        }
    }
}

// Allowed (old, new) pairs besides identity.
const COMPATIBLE_TRANSITIONS: &[(DataType, DataType)] = &[
    (DataType::Text, DataType::Select),
    (DataType::Select, DataType::Text),
    (DataType::Text, DataType::TreeSelect),
    (DataType::TreeSelect, DataType::Text),
    (DataType::Select, DataType::TreeSelect),
    (DataType::TreeSelect, DataType::Select),
    (DataType::Textarea, DataType::Richtext),
    (DataType::Richtext, DataType::Textarea),
    (DataType::Text, DataType::Textarea),
    (DataType::Date, DataType::Datetime),
];

impl DataType {
    pub const ALL: [DataType; 10] = [
        DataType::Text,
        DataType::Textarea,
        DataType::Richtext,
        DataType::Select,
        DataType::TreeSelect,
        DataType::Checkbox,
        DataType::Boolean,
        DataType::Integer,
        DataType::Date,
        DataType::Datetime,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Richtext => "richtext",
            Self::Select => "select",
            Self::TreeSelect => "tree_select",
            Self::Checkbox => "checkbox",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Date => "date",
            Self::Datetime => "datetime",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|data_type| data_type.as_str() == value)
    }

    /// Types whose values come from a fixed `options` list.
    pub fn is_enumeration(self) -> bool {
        matches!(self, Self::Select | Self::TreeSelect | Self::Checkbox)
    }

    /// Fills unset keys from [`defaults_for`]; explicit values are kept.
    pub fn fill_defaults(self, option: &mut DataOption) {
        for (key, value) in defaults_for(self).iter() {
            if option.is_unset(key) {
                option.set(key.clone(), value.clone());
            }
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default data option values for one type.
pub fn defaults_for(data_type: DataType) -> DataOption {
    let mut defaults = DataOption::new();
    defaults.set(KEY_NULL, true);
    if data_type.is_enumeration() {
        defaults.set(KEY_MAXLENGTH, DEFAULT_MAXLENGTH);
        defaults.set(KEY_NULLOPTION, true);
    }
    defaults
}

/// Whether an existing attribute of `old` may be edited into `new`.
pub fn is_compatible(old: DataType, new: DataType) -> bool {
    old == new || COMPATIBLE_TRANSITIONS.contains(&(old, new))
}

/// Column type for a type and its (normalized) options.
pub fn storage_type_for(data_type: DataType, option: &DataOption) -> StorageType {
    match data_type {
        DataType::Text | DataType::Select | DataType::TreeSelect | DataType::Checkbox => {
            StorageType::Varchar(option.maxlength().unwrap_or(DEFAULT_MAXLENGTH))
        }
        DataType::Textarea | DataType::Richtext => StorageType::Text,
        DataType::Boolean => StorageType::Boolean,
        DataType::Integer => StorageType::Integer,
        DataType::Date => StorageType::Date,
        DataType::Datetime => StorageType::Timestamp,
    }
}

/// Checks option values the engine interprets for `data_type`.
pub fn validate_data_option(
    data_type: DataType,
    option: &DataOption,
) -> Result<(), DataOptionError> {
    if let Some(raw) = option.get(KEY_MAXLENGTH).filter(|value| !value.is_null()) {
        match raw.as_u64() {
            Some(length) if (1..=MAX_MAXLENGTH).contains(&length) => {}
            _ => return Err(DataOptionError::InvalidMaxlength(raw.to_string())),
        }
    }

    if data_type.is_enumeration() && option.enum_options()?.is_empty() {
        return Err(DataOptionError::MissingOptions(data_type.as_str()));
    }

    if data_type == DataType::Integer {
        let min = option.get(KEY_MIN).and_then(Value::as_i64);
        let max = option.get(KEY_MAX).and_then(Value::as_i64);
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(DataOptionError::InvalidRange { min, max });
            }
        }
    }

    if let Some(default) = option.default_value() {
        let valid = match data_type {
            DataType::Boolean => default.is_boolean(),
            DataType::Integer => default.is_i64(),
            _ => default.is_string() || default.is_number() || default.is_boolean(),
        };
        if !valid {
            return Err(DataOptionError::InvalidDefault {
                data_type: data_type.as_str(),
                reason: "value type does not match the column",
            });
        }
    }

    Ok(())
}
