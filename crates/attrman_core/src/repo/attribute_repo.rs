//! Attribute catalog repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist and query `object_manager_attributes` rows.
//! - Provide the single-writer scope used to serialize catalog edits.
//!
//! # Invariants
//! - Read paths reject invalid persisted rows instead of masking them.
//! - `mark_migrated`/`delete` only touch the revision they were given.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::attribute::{AttributeDefinition, AttributeId};
use crate::model::data_option::DataOption;
use crate::model::data_type::DataType;
use crate::model::object_type::ObjectType;
use crate::model::screen::Screens;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const CATALOG_TABLE: &str = "object_manager_attributes";

const ATTRIBUTE_SELECT_SQL: &str = "SELECT
    uuid,
    object_type,
    name,
    display,
    data_type,
    data_option,
    screens,
    position,
    editable,
    active,
    migrated,
    to_delete,
    revision,
    created_at,
    updated_at
FROM object_manager_attributes";

pub type RepoResult<T> = Result<T, RepoError>;

/// Catalog persistence errors.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound {
        object_type: ObjectType,
        name: String,
    },
    /// Connection was not bootstrapped to the expected version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { object_type, name } => {
                write!(f, "attribute not found: {object_type}.{name}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "attribute catalog requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "attribute catalog requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted attribute data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Filter for catalog listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeListQuery {
    pub object_type: Option<ObjectType>,
    /// Only migrated, active definitions not pending removal.
    pub live_only: bool,
}

/// Repository interface for the attribute catalog.
pub trait AttributeRepository {
    fn find(&self, object_type: ObjectType, name: &str) -> RepoResult<Option<AttributeDefinition>>;
    fn insert(&self, definition: &AttributeDefinition) -> RepoResult<()>;
    /// Replaces every mutable column of the row with `definition.id`.
    fn update(&self, definition: &AttributeDefinition) -> RepoResult<()>;
    /// Ordered by `position`, creation time, then name.
    fn list(&self, query: &AttributeListQuery) -> RepoResult<Vec<AttributeDefinition>>;
    /// Definitions with `migrated = false`, oldest first.
    fn list_pending(&self) -> RepoResult<Vec<AttributeDefinition>>;
    fn count_pending(&self) -> RepoResult<u64>;
    /// Returns `false` when the row moved past `revision` meanwhile.
    fn mark_migrated(&self, id: AttributeId, revision: i64) -> RepoResult<bool>;
    /// Returns `false` when the row moved past `revision` meanwhile.
    fn delete(&self, id: AttributeId, revision: i64) -> RepoResult<bool>;
    /// Runs `f` holding the catalog write lock; commits on `Ok`.
    fn write_locked<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
        Self: Sized;
}

/// SQLite-backed attribute catalog.
pub struct SqliteAttributeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttributeRepository<'conn> {
    /// Creates a repository over a bootstrapped connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_catalog_ready(conn)?;
        Ok(Self { conn })
    }
}

impl AttributeRepository for SqliteAttributeRepository<'_> {
    fn find(&self, object_type: ObjectType, name: &str) -> RepoResult<Option<AttributeDefinition>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ATTRIBUTE_SELECT_SQL}
             WHERE object_type = ?1
               AND name = ?2;"
        ))?;
        let mut rows = stmt.query(params![object_type.as_str(), name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_attribute_row(row)?));
        }
        Ok(None)
    }

    fn insert(&self, definition: &AttributeDefinition) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO object_manager_attributes (
                uuid,
                object_type,
                name,
                display,
                data_type,
                data_option,
                screens,
                position,
                editable,
                active,
                migrated,
                to_delete,
                revision
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            params![
                definition.id.to_string(),
                definition.object_type.as_str(),
                definition.name.as_str(),
                definition.display.as_str(),
                definition.data_type.as_str(),
                encode_json(&definition.data_option, "data_option")?,
                encode_json(&definition.screens, "screens")?,
                definition.position,
                bool_to_int(definition.editable),
                bool_to_int(definition.active),
                bool_to_int(definition.migrated),
                bool_to_int(definition.to_delete),
                definition.revision,
            ],
        )?;
        Ok(())
    }

    fn update(&self, definition: &AttributeDefinition) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE object_manager_attributes
             SET
                display = ?2,
                data_type = ?3,
                data_option = ?4,
                screens = ?5,
                position = ?6,
                editable = ?7,
                active = ?8,
                migrated = ?9,
                to_delete = ?10,
                revision = ?11,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                definition.id.to_string(),
                definition.display.as_str(),
                definition.data_type.as_str(),
                encode_json(&definition.data_option, "data_option")?,
                encode_json(&definition.screens, "screens")?,
                definition.position,
                bool_to_int(definition.editable),
                bool_to_int(definition.active),
                bool_to_int(definition.migrated),
                bool_to_int(definition.to_delete),
                definition.revision,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                object_type: definition.object_type,
                name: definition.name.clone(),
            });
        }
        Ok(())
    }

    fn list(&self, query: &AttributeListQuery) -> RepoResult<Vec<AttributeDefinition>> {
        let mut sql = format!("{ATTRIBUTE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<SqlValue> = Vec::new();

        if let Some(object_type) = query.object_type {
            sql.push_str(" AND object_type = ?");
            bind_values.push(SqlValue::Text(object_type.as_str().to_string()));
        }
        if query.live_only {
            sql.push_str(" AND migrated = 1 AND active = 1 AND to_delete = 0");
        }
        sql.push_str(" ORDER BY position ASC, created_at ASC, name ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut definitions = Vec::new();
        while let Some(row) = rows.next()? {
            definitions.push(parse_attribute_row(row)?);
        }
        Ok(definitions)
    }

    fn list_pending(&self) -> RepoResult<Vec<AttributeDefinition>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ATTRIBUTE_SELECT_SQL}
             WHERE migrated = 0
             ORDER BY created_at ASC, name ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut definitions = Vec::new();
        while let Some(row) = rows.next()? {
            definitions.push(parse_attribute_row(row)?);
        }
        Ok(definitions)
    }

    fn count_pending(&self) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM object_manager_attributes WHERE migrated = 0;",
            [],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative pending count `{count}`")))
    }

    fn mark_migrated(&self, id: AttributeId, revision: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE object_manager_attributes
             SET
                migrated = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND revision = ?2;",
            params![id.to_string(), revision],
        )?;
        Ok(changed == 1)
    }

    fn delete(&self, id: AttributeId, revision: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM object_manager_attributes
             WHERE uuid = ?1
               AND revision = ?2
               AND to_delete = 1;",
            params![id.to_string(), revision],
        )?;
        Ok(changed == 1)
    }

    fn write_locked<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        // IMMEDIATE takes the database write lock before the first read, so
        // the existence check and the write cannot interleave with another
        // writer. Dropping `tx` on error rolls back.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let value = f(self)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }
}

fn parse_attribute_row(row: &Row<'_>) -> RepoResult<AttributeDefinition> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid `{uuid_text}` in {CATALOG_TABLE}.uuid"))
    })?;

    let object_type_text: String = row.get("object_type")?;
    let object_type = ObjectType::parse(&object_type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid object type `{object_type_text}` in {CATALOG_TABLE}.object_type"
        ))
    })?;

    let data_type_text: String = row.get("data_type")?;
    let data_type = DataType::parse(&data_type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid data type `{data_type_text}` in {CATALOG_TABLE}.data_type"
        ))
    })?;

    let data_option: DataOption = decode_json(&row.get::<_, String>("data_option")?, "data_option")?;
    let screens: Screens = decode_json(&row.get::<_, String>("screens")?, "screens")?;

    Ok(AttributeDefinition {
        id,
        object_type,
        name: row.get("name")?,
        display: row.get("display")?,
        data_type,
        data_option,
        screens,
        position: row.get("position")?,
        editable: int_to_bool(row.get("editable")?, "editable")?,
        active: int_to_bool(row.get("active")?, "active")?,
        migrated: int_to_bool(row.get("migrated")?, "migrated")?,
        to_delete: int_to_bool(row.get("to_delete")?, "to_delete")?,
        revision: row.get("revision")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn encode_json<T: serde::Serialize>(value: &T, column: &'static str) -> RepoResult<String> {
    serde_json::to_string(value).map_err(|err| {
        RepoError::InvalidData(format!("cannot encode {CATALOG_TABLE}.{column}: {err}"))
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(text: &str, column: &'static str) -> RepoResult<T> {
    serde_json::from_str(text).map_err(|err| {
        RepoError::InvalidData(format!("invalid json in {CATALOG_TABLE}.{column}: {err}"))
    })
}

fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in {CATALOG_TABLE}.{column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn ensure_catalog_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
        );",
        [CATALOG_TABLE],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(RepoError::MissingRequiredTable(CATALOG_TABLE));
    }
    Ok(())
}
