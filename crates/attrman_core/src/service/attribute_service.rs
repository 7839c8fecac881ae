//! Attribute definition store use-cases.
//!
//! # Responsibility
//! - Gate submissions through name and data option validation.
//! - Create, edit, and flag definitions for removal under the catalog write
//!   lock.
//! - Serve live definitions annotated with per-viewer screen visibility.
//!
//! # Invariants
//! - At most one definition exists per `(object_type, name)`.
//! - A type change is accepted only for compatible transitions.
//! - Schema-relevant edits reset `migrated` and bump `revision`; other edits
//!   keep the definition live.
//! - Read paths only return live definitions.

use crate::model::attribute::{
    AttributeDefinition, AttributeId, AttributeParams, AttributeValidationError,
};
use crate::model::data_option::{DataOption, DataOptionError};
use crate::model::data_type::{is_compatible, DataType};
use crate::model::name::NameError;
use crate::model::object_type::ObjectType;
use crate::model::screen::EffectiveVisibility;
use crate::repo::attribute_repo::{AttributeListQuery, AttributeRepository, RepoError};
use crate::schema::planner::storage_signature;
use crate::visibility::merge::{effective_screens, effective_visibility, VisibilityPolicy};
use crate::visibility::viewer::{HeldPermissions, PermissionLookupError, PermissionSource};
use log::{error, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors from attribute store operations.
#[derive(Debug)]
pub enum AttributeError {
    /// Name rejected by the name validator.
    Name(NameError),
    /// Data options invalid for the data type.
    DataOption(DataOptionError),
    /// Re-add changes an existing attribute to an incompatible type.
    ConflictingType {
        name: String,
        existing: DataType,
        requested: DataType,
    },
    /// Name equals a built-in column of the object type.
    CoreColumn {
        object_type: ObjectType,
        name: String,
    },
    NotFound {
        object_type: ObjectType,
        name: String,
    },
    /// Definition is locked against removal.
    NotEditable {
        object_type: ObjectType,
        name: String,
    },
    PermissionLookup(PermissionLookupError),
    Repo(RepoError),
}

impl AttributeError {
    /// Stable identifier used in log lines.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Name(NameError::ReservedWord(_)) => "reserved_word",
            Self::Name(NameError::ReferenceSuffix(_)) => "reference_suffix",
            Self::Name(_) => "invalid_name",
            Self::DataOption(_) => "invalid_data_option",
            Self::ConflictingType { .. } => "conflicting_type",
            Self::CoreColumn { .. } => "core_column",
            Self::NotFound { .. } => "not_found",
            Self::NotEditable { .. } => "not_editable",
            Self::PermissionLookup(_) => "permission_lookup_failed",
            Self::Repo(_) => "repo_error",
        }
    }
}

impl Display for AttributeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(err) => write!(f, "{err}"),
            Self::DataOption(err) => write!(f, "{err}"),
            Self::ConflictingType {
                name,
                existing,
                requested,
            } => write!(
                f,
                "attribute `{name}` already exists with data type `{existing}`; cannot change it to `{requested}`"
            ),
            Self::CoreColumn { object_type, name } => {
                write!(f, "`{name}` is a built-in attribute of {object_type}")
            }
            Self::NotFound { object_type, name } => {
                write!(f, "attribute not found: {object_type}.{name}")
            }
            Self::NotEditable { object_type, name } => {
                write!(f, "attribute {object_type}.{name} is not editable")
            }
            Self::PermissionLookup(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AttributeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Name(err) => Some(err),
            Self::DataOption(err) => Some(err),
            Self::PermissionLookup(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NameError> for AttributeError {
    fn from(value: NameError) -> Self {
        Self::Name(value)
    }
}

impl From<DataOptionError> for AttributeError {
    fn from(value: DataOptionError) -> Self {
        Self::DataOption(value)
    }
}

impl From<AttributeValidationError> for AttributeError {
    fn from(value: AttributeValidationError) -> Self {
        match value {
            AttributeValidationError::Name(err) => Self::Name(err),
            AttributeValidationError::DataOption(err) => Self::DataOption(err),
        }
    }
}

impl From<PermissionLookupError> for AttributeError {
    fn from(value: PermissionLookupError) -> Self {
        Self::PermissionLookup(value)
    }
}

impl From<RepoError> for AttributeError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Result of one `add` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Created,
    Updated,
    Unchanged,
}

impl AddOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Live definition annotated for one viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeView {
    pub id: AttributeId,
    pub object_type: ObjectType,
    pub name: String,
    pub display: String,
    pub data_type: DataType,
    pub data_option: DataOption,
    pub position: i64,
    pub editable: bool,
    /// Effective rule per declared screen.
    pub screen: BTreeMap<String, EffectiveVisibility>,
}

/// Use-case service over the attribute catalog.
pub struct AttributeService<R: AttributeRepository> {
    repo: R,
    policy: VisibilityPolicy,
}

impl<R: AttributeRepository> AttributeService<R> {
    pub fn new(repo: R, policy: VisibilityPolicy) -> Self {
        Self { repo, policy }
    }

    /// Creates or edits the definition `(object_type, params.name)`.
    ///
    /// # Contract
    /// - Name validation runs before anything else.
    /// - `data_option` (or `data_option_new`) is normalized with type defaults.
    /// - Repeating an identical call leaves exactly one unchanged definition.
    /// - Reviving a definition flagged for removal clears the flag.
    ///
    /// # Errors
    /// - `Name` / `DataOption` for invalid input.
    /// - `CoreColumn` when the name shadows a built-in column.
    /// - `ConflictingType` for an incompatible type change.
    pub fn add(
        &self,
        object_type: ObjectType,
        params: AttributeParams,
    ) -> Result<AttributeDefinition, AttributeError> {
        let started_at = Instant::now();
        let name = params.name.clone();
        let result = self.add_inner(object_type, params);
        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok((definition, outcome)) => info!(
                "event=attribute_add module=service status=ok object_type={object_type} name={} outcome={} revision={} migrated={} duration_ms={duration_ms}",
                definition.name,
                outcome.as_str(),
                definition.revision,
                definition.migrated
            ),
            Err(err) => error!(
                "event=attribute_add module=service status=error object_type={object_type} name={} error_code={} duration_ms={duration_ms}",
                log_safe_name(&name),
                err.error_code()
            ),
        }
        result.map(|(definition, _)| definition)
    }

    fn add_inner(
        &self,
        object_type: ObjectType,
        params: AttributeParams,
    ) -> Result<(AttributeDefinition, AddOutcome), AttributeError> {
        let mut candidate = AttributeDefinition::from_params(object_type, params);
        candidate.validate()?;
        if object_type.is_core_column(&candidate.name) {
            return Err(AttributeError::CoreColumn {
                object_type,
                name: candidate.name,
            });
        }

        self.repo.write_locked(|repo| {
            let Some(existing) = repo.find(object_type, &candidate.name)? else {
                repo.insert(&candidate)?;
                let stored = reload(repo, object_type, &candidate.name)?;
                return Ok((stored, AddOutcome::Created));
            };

            if existing.data_type != candidate.data_type
                && !is_compatible(existing.data_type, candidate.data_type)
            {
                return Err(AttributeError::ConflictingType {
                    name: candidate.name,
                    existing: existing.data_type,
                    requested: candidate.data_type,
                });
            }

            let edited = apply_edit(&existing, &candidate)?;
            if edited == existing {
                return Ok((existing, AddOutcome::Unchanged));
            }
            repo.update(&edited)?;
            let stored = reload(repo, object_type, &edited.name)?;
            Ok((stored, AddOutcome::Updated))
        })
    }

    /// Flags a definition for removal by the next migration run.
    ///
    /// Repeating the call on a flagged definition is a no-op.
    pub fn remove(
        &self,
        object_type: ObjectType,
        name: &str,
    ) -> Result<AttributeDefinition, AttributeError> {
        let result: Result<AttributeDefinition, AttributeError> = self.repo.write_locked(|repo| {
            let existing = repo
                .find(object_type, name)?
                .ok_or_else(|| AttributeError::NotFound {
                    object_type,
                    name: name.to_string(),
                })?;
            if !existing.editable {
                return Err(AttributeError::NotEditable {
                    object_type,
                    name: existing.name,
                });
            }
            if existing.to_delete {
                return Ok(existing);
            }

            let mut flagged = existing;
            flagged.to_delete = true;
            flagged.migrated = false;
            flagged.revision += 1;
            repo.update(&flagged)?;
            reload(repo, object_type, &flagged.name)
        });

        match &result {
            Ok(definition) => info!(
                "event=attribute_remove module=service status=ok object_type={object_type} name={} revision={}",
                definition.name, definition.revision
            ),
            Err(err) => error!(
                "event=attribute_remove module=service status=error object_type={object_type} name={} error_code={}",
                log_safe_name(name),
                err.error_code()
            ),
        }
        result
    }

    /// Gets one definition regardless of lifecycle state.
    pub fn get(
        &self,
        object_type: ObjectType,
        name: &str,
    ) -> Result<Option<AttributeDefinition>, AttributeError> {
        Ok(self.repo.find(object_type, name)?)
    }

    /// Lists every definition of `object_type`, pending ones included.
    pub fn list(&self, object_type: ObjectType) -> Result<Vec<AttributeDefinition>, AttributeError> {
        let query = AttributeListQuery {
            object_type: Some(object_type),
            live_only: false,
        };
        Ok(self.repo.list(&query)?)
    }

    /// Definitions waiting for `migration_execute`, oldest first.
    pub fn list_pending(&self) -> Result<Vec<AttributeDefinition>, AttributeError> {
        Ok(self.repo.list_pending()?)
    }

    /// Returns whether any definition waits for migration.
    pub fn pending_migration(&self) -> Result<bool, AttributeError> {
        Ok(self.repo.count_pending()? > 0)
    }

    /// Live definitions of `object_type` with effective visibility for
    /// `viewer`, ordered by position.
    ///
    /// Permission lookup failures are returned unchanged.
    pub fn by_object(
        &self,
        object_type: ObjectType,
        viewer: &impl PermissionSource,
    ) -> Result<Vec<AttributeView>, AttributeError> {
        let held = HeldPermissions::resolve(viewer).map_err(|err| {
            error!(
                "event=attribute_by_object module=service status=error object_type={object_type} error_code=permission_lookup_failed"
            );
            AttributeError::from(err)
        })?;

        let query = AttributeListQuery {
            object_type: Some(object_type),
            live_only: true,
        };
        let views = self
            .repo
            .list(&query)?
            .into_iter()
            .map(|definition| {
                let screen = effective_screens(&definition, &held, self.policy);
                AttributeView {
                    id: definition.id,
                    object_type: definition.object_type,
                    name: definition.name,
                    display: definition.display,
                    data_type: definition.data_type,
                    data_option: definition.data_option,
                    position: definition.position,
                    editable: definition.editable,
                    screen,
                }
            })
            .collect();
        Ok(views)
    }

    /// Effective rule of one live attribute on one screen.
    pub fn effective_visibility(
        &self,
        object_type: ObjectType,
        name: &str,
        screen: &str,
        viewer: &impl PermissionSource,
    ) -> Result<EffectiveVisibility, AttributeError> {
        let held = HeldPermissions::resolve(viewer)?;
        let definition = self
            .repo
            .find(object_type, name)?
            .filter(AttributeDefinition::is_live)
            .ok_or_else(|| AttributeError::NotFound {
                object_type,
                name: name.to_string(),
            })?;
        Ok(effective_visibility(&definition, screen, &held, self.policy))
    }
}

/// Merges `candidate` onto `existing`, deciding whether storage must change.
fn apply_edit(
    existing: &AttributeDefinition,
    candidate: &AttributeDefinition,
) -> Result<AttributeDefinition, AttributeError> {
    let mut edited = existing.clone();
    edited.display = candidate.display.clone();
    edited.data_type = candidate.data_type;
    edited.data_option = candidate.data_option.clone();
    edited.screens = candidate.screens.clone();
    edited.position = candidate.position;
    edited.editable = candidate.editable;
    edited.active = candidate.active;
    edited.to_delete = false;

    let requested = storage_signature(&edited)?;
    let schema_changed = existing.to_delete
        || existing.data_type != edited.data_type
        || storage_signature(existing).ok().as_ref() != Some(&requested);
    if schema_changed {
        edited.migrated = false;
        edited.revision = existing.revision + 1;
    }
    Ok(edited)
}

fn reload<R: AttributeRepository>(
    repo: &R,
    object_type: ObjectType,
    name: &str,
) -> Result<AttributeDefinition, AttributeError> {
    repo.find(object_type, name)?
        .ok_or_else(|| AttributeError::NotFound {
            object_type,
            name: name.to_string(),
        })
}

/// Caps rejected names before they reach log lines.
fn log_safe_name(name: &str) -> String {
    name.chars()
        .take(64)
        .map(|ch| if ch.is_ascii_graphic() { ch } else { '?' })
        .collect()
}
