//! Read-only inspection of live attribute storage.

use crate::model::data_option::EnumOption;
use crate::schema::ddl::{quote_identifier, ColumnSpec};
use rusqlite::{Connection, OptionalExtension};

/// Declared shape of `table.column`, or `None` when the column is absent.
pub fn column_spec(
    conn: &Connection,
    table: &str,
    column: &str,
) -> rusqlite::Result<Option<ColumnSpec>> {
    conn.query_row(
        "SELECT name, type, \"notnull\", dflt_value
         FROM pragma_table_info(?1)
         WHERE name = ?2;",
        [table, column],
        |row| {
            Ok(ColumnSpec {
                name: row.get(0)?,
                sql_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                default_sql: row.get(3)?,
            })
        },
    )
    .optional()
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Rows of an enumeration lookup table in position order.
pub fn lookup_options(conn: &Connection, table: &str) -> rusqlite::Result<Vec<EnumOption>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT value, label FROM {} ORDER BY position ASC, value ASC;",
        quote_identifier(table)
    ))?;
    let mut rows = stmt.query([])?;
    let mut options = Vec::new();
    while let Some(row) = rows.next()? {
        options.push(EnumOption {
            value: row.get(0)?,
            label: row.get(1)?,
        });
    }
    Ok(options)
}
