//! Core business objects that accept custom attributes.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Closed set of object types with a backing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Ticket,
    User,
    Organization,
    Group,
}

impl ObjectType {
    pub const ALL: [ObjectType; 4] = [
        ObjectType::Ticket,
        ObjectType::User,
        ObjectType::Organization,
        ObjectType::Group,
    ];

    /// Canonical name stored in the catalog.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ticket => "Ticket",
            Self::User => "User",
            Self::Organization => "Organization",
            Self::Group => "Group",
        }
    }

    /// Parses the canonical name. Matching is exact.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|object_type| object_type.as_str() == value)
    }

    /// Table holding object rows and their custom attribute columns.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Ticket => "tickets",
            Self::User => "users",
            Self::Organization => "organizations",
            Self::Group => "groups",
        }
    }

    /// Columns created by bootstrap. Attributes must not shadow them.
    pub fn core_columns(self) -> &'static [&'static str] {
        match self {
            Self::Ticket => &[
                "id",
                "number",
                "title",
                "state",
                "priority",
                "group_id",
                "owner_id",
                "customer_id",
                "organization_id",
                "created_at",
                "updated_at",
            ],
            Self::User => &[
                "id",
                "login",
                "firstname",
                "lastname",
                "email",
                "organization_id",
                "active",
                "created_at",
                "updated_at",
            ],
            Self::Organization | Self::Group => {
                &["id", "name", "note", "active", "created_at", "updated_at"]
            }
        }
    }

    pub fn is_core_column(self, name: &str) -> bool {
        self.core_columns()
            .iter()
            .any(|column| column.eq_ignore_ascii_case(name))
    }
}

impl Display for ObjectType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectType;

    #[test]
    fn parses_canonical_names_only() {
        for object_type in ObjectType::ALL {
            assert_eq!(ObjectType::parse(object_type.as_str()), Some(object_type));
        }
        assert_eq!(ObjectType::parse("ticket"), None);
        assert_eq!(ObjectType::parse(""), None);
    }

    #[test]
    fn core_columns_are_matched_case_insensitively() {
        assert!(ObjectType::Ticket.is_core_column("title"));
        assert!(ObjectType::Ticket.is_core_column("Title"));
        assert!(!ObjectType::Ticket.is_core_column("login"));
        assert!(ObjectType::User.is_core_column("login"));
    }
}
