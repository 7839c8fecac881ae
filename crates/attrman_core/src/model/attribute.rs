//! Attribute definition domain model.
//!
//! # Responsibility
//! - Define the catalog record for one custom attribute.
//! - Normalize data options through the type registry before validation.
//!
//! # Invariants
//! - `(object_type, name)` identifies at most one definition.
//! - `validate()` fills defaults on every call, never clobbering explicit
//!   values.
//! - `migrated == false` means the backing schema may lag the definition.

use crate::model::data_option::{DataOption, DataOptionError};
use crate::model::data_type::{validate_data_option, DataType};
use crate::model::name::{validate_name, NameError};
use crate::model::object_type::ObjectType;
use crate::model::screen::Screens;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one attribute definition.
pub type AttributeId = Uuid;

/// Caller input for `add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeParams {
    pub name: String,
    /// User-facing label. Falls back to `name` when blank.
    #[serde(default)]
    pub display: String,
    pub data_type: DataType,
    #[serde(default)]
    pub data_option: DataOption,
    /// Options for a new data type; replaces `data_option` when present.
    #[serde(default)]
    pub data_option_new: Option<DataOption>,
    #[serde(default)]
    pub screens: Screens,
    #[serde(default)]
    pub position: i64,
    #[serde(default = "default_true")]
    pub editable: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl AttributeParams {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            display: String::new(),
            data_type,
            data_option: DataOption::new(),
            data_option_new: None,
            screens: Screens::new(),
            position: 0,
            editable: true,
            active: true,
        }
    }
}

/// Catalog record of one custom attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDefinition {
    pub id: AttributeId,
    pub object_type: ObjectType,
    pub name: String,
    pub display: String,
    pub data_type: DataType,
    pub data_option: DataOption,
    pub screens: Screens,
    pub position: i64,
    pub editable: bool,
    pub active: bool,
    /// Backing schema matches this definition.
    pub migrated: bool,
    /// Removal requested; the next migration drops the column.
    pub to_delete: bool,
    /// Bumped on every schema-relevant change.
    pub revision: i64,
    /// Epoch ms; assigned by storage.
    pub created_at: i64,
    /// Epoch ms; assigned by storage.
    pub updated_at: i64,
}

impl AttributeDefinition {
    /// Builds an unsaved, pending definition from caller input.
    pub fn from_params(object_type: ObjectType, params: AttributeParams) -> Self {
        let display = if params.display.trim().is_empty() {
            params.name.clone()
        } else {
            params.display
        };
        Self {
            id: Uuid::new_v4(),
            object_type,
            name: params.name,
            display,
            data_type: params.data_type,
            data_option: params.data_option_new.unwrap_or(params.data_option),
            screens: params.screens,
            position: params.position,
            editable: params.editable,
            active: params.active,
            migrated: false,
            to_delete: false,
            revision: 1,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Fills type defaults into `data_option`.
    pub fn normalize(&mut self) {
        self.data_type.fill_defaults(&mut self.data_option);
    }

    /// Normalizes, then validates name and data options.
    pub fn validate(&mut self) -> Result<(), AttributeValidationError> {
        self.normalize();
        validate_name(&self.name)?;
        validate_data_option(self.data_type, &self.data_option)?;
        Ok(())
    }

    /// Visible to read paths: live schema, active, not being removed.
    pub fn is_live(&self) -> bool {
        self.migrated && self.active && !self.to_delete
    }
}

/// Validation failures of a single definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValidationError {
    Name(NameError),
    DataOption(DataOptionError),
}

impl Display for AttributeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(err) => write!(f, "{err}"),
            Self::DataOption(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AttributeValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Name(err) => Some(err),
            Self::DataOption(err) => Some(err),
        }
    }
}

impl From<NameError> for AttributeValidationError {
    fn from(value: NameError) -> Self {
        Self::Name(value)
    }
}

impl From<DataOptionError> for AttributeValidationError {
    fn from(value: DataOptionError) -> Self {
        Self::DataOption(value)
    }
}
