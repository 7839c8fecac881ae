//! Derives the DDL that converges live storage to one definition.

use crate::model::attribute::AttributeDefinition;
use crate::model::data_option::{DataOptionError, EnumOption};
use crate::model::data_type::storage_type_for;
use crate::model::object_type::ObjectType;
use crate::schema::ddl::{quote_literal, ColumnSpec, DdlOperation};
use crate::schema::inspect::{column_spec, lookup_options, table_exists};
use rusqlite::Connection;
use serde_json::Value;

/// Storage-relevant projection of a definition.
///
/// Two definitions with equal signatures need no DDL between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSignature {
    pub column: ColumnSpec,
    /// Empty for non-enumeration types.
    pub options: Vec<EnumOption>,
}

/// Live storage state relevant to one definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSchema {
    pub column: Option<ColumnSpec>,
    pub lookup_table: bool,
    pub lookup_options: Vec<EnumOption>,
}

pub fn lookup_table_name(object_type: ObjectType, name: &str) -> String {
    format!("{}_{name}_options", object_type.table_name())
}

/// Column declaration for a normalized definition.
pub fn column_spec_for(definition: &AttributeDefinition) -> ColumnSpec {
    let option = &definition.data_option;
    let default_sql = option.default_value().map(default_literal);
    ColumnSpec {
        name: definition.name.clone(),
        sql_type: storage_type_for(definition.data_type, option).sql(),
        not_null: option.null() == Some(false) && default_sql.is_some(),
        default_sql,
    }
}

pub fn storage_signature(
    definition: &AttributeDefinition,
) -> Result<StorageSignature, DataOptionError> {
    let options = if definition.data_type.is_enumeration() {
        definition.data_option.enum_options()?
    } else {
        Vec::new()
    };
    Ok(StorageSignature {
        column: column_spec_for(definition),
        options,
    })
}

pub fn inspect_live(
    conn: &Connection,
    definition: &AttributeDefinition,
) -> rusqlite::Result<LiveSchema> {
    let table = definition.object_type.table_name();
    let lookup_table = lookup_table_name(definition.object_type, &definition.name);
    let column = column_spec(conn, table, &definition.name)?;
    let lookup_exists = table_exists(conn, &lookup_table)?;
    let options = if lookup_exists {
        lookup_options(conn, &lookup_table)?
    } else {
        Vec::new()
    };
    Ok(LiveSchema {
        column,
        lookup_table: lookup_exists,
        lookup_options: options,
    })
}

/// Operations that bring `live` in line with `definition`.
pub fn plan(
    definition: &AttributeDefinition,
    live: &LiveSchema,
) -> Result<Vec<DdlOperation>, DataOptionError> {
    let table = definition.object_type.table_name();
    let lookup_table = lookup_table_name(definition.object_type, &definition.name);
    let mut operations = Vec::new();

    if definition.to_delete {
        if live.column.is_some() {
            operations.push(DdlOperation::DropColumn {
                table,
                column: definition.name.clone(),
            });
        }
        if live.lookup_table {
            operations.push(DdlOperation::DropLookupTable {
                table: lookup_table,
            });
        }
        return Ok(operations);
    }

    let signature = storage_signature(definition)?;
    match &live.column {
        None => operations.push(DdlOperation::AddColumn {
            table,
            column: signature.column,
        }),
        Some(current) if !current.matches(&signature.column) => {
            operations.push(DdlOperation::AlterColumn {
                table,
                from: current.clone(),
                to: signature.column,
            });
        }
        Some(_) => {}
    }

    if definition.data_type.is_enumeration() {
        if !live.lookup_table {
            operations.push(DdlOperation::CreateLookupTable {
                table: lookup_table.clone(),
            });
        }
        if live.lookup_options != signature.options {
            operations.push(DdlOperation::SyncLookupOptions {
                table: lookup_table,
                options: signature.options,
            });
        }
    } else if live.lookup_table {
        operations.push(DdlOperation::DropLookupTable {
            table: lookup_table,
        });
    }

    Ok(operations)
}

fn default_literal(value: &Value) -> String {
    match value {
        Value::Bool(flag) => String::from(if *flag { "1" } else { "0" }),
        Value::Number(number) => number.to_string(),
        Value::String(text) => quote_literal(text),
        other => quote_literal(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{column_spec_for, lookup_table_name, plan, storage_signature, LiveSchema};
    use crate::model::attribute::{AttributeDefinition, AttributeParams};
    use crate::model::data_option::DataOption;
    use crate::model::data_type::DataType;
    use crate::model::object_type::ObjectType;
    use crate::schema::ddl::DdlOperation;
    use serde_json::json;

    fn definition(data_type: DataType, data_option: serde_json::Value) -> AttributeDefinition {
        let mut params = AttributeParams::new("customer_rating", data_type);
        params.data_option = DataOption::from_value(data_option).expect("object data option");
        let mut definition = AttributeDefinition::from_params(ObjectType::Ticket, params);
        definition.validate().expect("valid definition");
        definition
    }

    fn kinds(operations: &[DdlOperation]) -> Vec<&'static str> {
        operations.iter().map(DdlOperation::kind).collect()
    }

    #[test]
    fn new_select_adds_column_and_lookup_table() {
        let select = definition(DataType::Select, json!({ "options": { "a": "A" } }));
        let operations = plan(&select, &LiveSchema::default()).unwrap();
        assert_eq!(
            kinds(&operations),
            vec!["add_column", "create_lookup_table", "sync_lookup_options"]
        );
    }

    #[test]
    fn converged_schema_plans_nothing() {
        let select = definition(DataType::Select, json!({ "options": { "a": "A" } }));
        let signature = storage_signature(&select).unwrap();
        let live = LiveSchema {
            column: Some(signature.column),
            lookup_table: true,
            lookup_options: signature.options,
        };
        assert!(plan(&select, &live).unwrap().is_empty());
    }

    #[test]
    fn changed_declaration_plans_alter() {
        let text = definition(DataType::Text, json!({ "maxlength": 40 }));
        let live = LiveSchema {
            column: Some(column_spec_for(&definition(DataType::Text, json!({})))),
            ..LiveSchema::default()
        };
        assert_eq!(kinds(&plan(&text, &live).unwrap()), vec!["alter_column"]);
    }

    #[test]
    fn leaving_enumeration_drops_lookup_table() {
        let text = definition(DataType::Text, json!({}));
        let live = LiveSchema {
            column: Some(column_spec_for(&text)),
            lookup_table: true,
            lookup_options: Vec::new(),
        };
        assert_eq!(kinds(&plan(&text, &live).unwrap()), vec!["drop_lookup_table"]);
    }

    #[test]
    fn removal_drops_existing_storage_only() {
        let mut select = definition(DataType::Select, json!({ "options": { "a": "A" } }));
        select.to_delete = true;
        let live = LiveSchema {
            column: Some(column_spec_for(&select)),
            lookup_table: true,
            lookup_options: Vec::new(),
        };
        assert_eq!(
            kinds(&plan(&select, &live).unwrap()),
            vec!["drop_column", "drop_lookup_table"]
        );
        assert!(plan(&select, &LiveSchema::default()).unwrap().is_empty());
    }

    #[test]
    fn not_null_requires_a_default() {
        let without_default = definition(DataType::Text, json!({ "null": false }));
        assert!(!column_spec_for(&without_default).not_null);

        let with_default = definition(DataType::Boolean, json!({ "null": false, "default": true }));
        let column = column_spec_for(&with_default);
        assert!(column.not_null);
        assert_eq!(column.default_sql.as_deref(), Some("1"));
        assert_eq!(column.sql_type, "BOOLEAN");
    }

    #[test]
    fn lookup_table_is_scoped_by_object_table() {
        assert_eq!(
            lookup_table_name(ObjectType::User, "shirt_size"),
            "users_shirt_size_options"
        );
    }
}
