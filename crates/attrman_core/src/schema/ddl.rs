//! DDL operation model and SQLite rendering.

use crate::model::data_option::EnumOption;

/// Suffix of the temporary column during a rebuild. `$` never appears in a
/// valid attribute name, so the temporary name cannot collide with one.
const PREVIOUS_COLUMN_SUFFIX: &str = "$previous";

/// Declared shape of one attribute column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    /// Default expression exactly as SQLite reports it in `table_info`.
    pub default_sql: Option<String>,
}

impl ColumnSpec {
    /// Column clause used by `ADD COLUMN`.
    pub fn definition_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_identifier(&self.name), self.sql_type);
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default_sql) = &self.default_sql {
            sql.push_str(" DEFAULT ");
            sql.push_str(default_sql);
        }
        sql
    }

    /// Same declared shape, ignoring type name case.
    pub fn matches(&self, other: &ColumnSpec) -> bool {
        self.name == other.name
            && self.sql_type.eq_ignore_ascii_case(&other.sql_type)
            && self.not_null == other.not_null
            && self.default_sql == other.default_sql
    }
}

/// One schema change derived from an attribute definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlOperation {
    AddColumn {
        table: &'static str,
        column: ColumnSpec,
    },
    /// Rebuilds a column with a new declaration, keeping its values.
    AlterColumn {
        table: &'static str,
        from: ColumnSpec,
        to: ColumnSpec,
    },
    DropColumn {
        table: &'static str,
        column: String,
    },
    CreateLookupTable {
        table: String,
    },
    /// Replaces the rows of a lookup table with `options`, in order.
    SyncLookupOptions {
        table: String,
        options: Vec<EnumOption>,
    },
    DropLookupTable {
        table: String,
    },
}

impl DdlOperation {
    /// Stable operation name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddColumn { .. } => "add_column",
            Self::AlterColumn { .. } => "alter_column",
            Self::DropColumn { .. } => "drop_column",
            Self::CreateLookupTable { .. } => "create_lookup_table",
            Self::SyncLookupOptions { .. } => "sync_lookup_options",
            Self::DropLookupTable { .. } => "drop_lookup_table",
        }
    }

    /// Statements implementing this operation, in execution order.
    pub fn statements(&self) -> Vec<String> {
        match self {
            Self::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {};",
                quote_identifier(table),
                column.definition_sql()
            )],
            Self::AlterColumn { table, from, to } => {
                let table = quote_identifier(table);
                let previous = format!("{}{PREVIOUS_COLUMN_SUFFIX}", from.name);
                let copy_source = match (&to.default_sql, to.not_null) {
                    (Some(default_sql), true) => {
                        format!("COALESCE({}, {default_sql})", quote_identifier(&previous))
                    }
                    _ => quote_identifier(&previous),
                };
                vec![
                    format!(
                        "ALTER TABLE {table} RENAME COLUMN {} TO {};",
                        quote_identifier(&from.name),
                        quote_identifier(&previous)
                    ),
                    format!("ALTER TABLE {table} ADD COLUMN {};", to.definition_sql()),
                    format!(
                        "UPDATE {table} SET {} = {copy_source};",
                        quote_identifier(&to.name)
                    ),
                    format!(
                        "ALTER TABLE {table} DROP COLUMN {};",
                        quote_identifier(&previous)
                    ),
                ]
            }
            Self::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {};",
                quote_identifier(table),
                quote_identifier(column)
            )],
            Self::CreateLookupTable { table } => vec![format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    value TEXT PRIMARY KEY NOT NULL,
                    label TEXT NOT NULL,
                    position INTEGER NOT NULL
                );",
                quote_identifier(table)
            )],
            Self::SyncLookupOptions { table, options } => {
                let table = quote_identifier(table);
                let mut statements = vec![format!("DELETE FROM {table};")];
                statements.extend(options.iter().enumerate().map(|(position, option)| {
                    format!(
                        "INSERT INTO {table} (value, label, position) VALUES ({}, {}, {position});",
                        quote_literal(&option.value),
                        quote_literal(&option.label)
                    )
                }));
                statements
            }
            Self::DropLookupTable { table } => {
                vec![format!("DROP TABLE IF EXISTS {};", quote_identifier(table))]
            }
        }
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
