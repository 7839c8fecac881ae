//! Viewer permissions consumed from the external role store.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure reported by the role/permission store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionLookupError {
    pub message: String,
}

impl PermissionLookupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for PermissionLookupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "permission lookup failed: {}", self.message)
    }
}

impl Error for PermissionLookupError {}

/// Source of the permission names held by the entity reading attributes.
pub trait PermissionSource {
    fn permissions(&self) -> Result<Vec<String>, PermissionLookupError>;
}

impl<T: PermissionSource + ?Sized> PermissionSource for &T {
    fn permissions(&self) -> Result<Vec<String>, PermissionLookupError> {
        (**self).permissions()
    }
}

/// In-memory viewer with a fixed permission set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    permissions: BTreeSet<String>,
}

impl Viewer {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// Viewer without any permission; only wildcard rules apply.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl PermissionSource for Viewer {
    fn permissions(&self) -> Result<Vec<String>, PermissionLookupError> {
        Ok(self.permissions.iter().cloned().collect())
    }
}

/// Normalized, resolved permission names of one viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldPermissions {
    names: BTreeSet<String>,
}

impl HeldPermissions {
    /// Resolves permissions once per read; lookup errors propagate.
    pub fn resolve(source: &impl PermissionSource) -> Result<Self, PermissionLookupError> {
        Ok(Self::from_names(source.permissions()?))
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Whether a rule keyed `key` applies to this viewer.
    ///
    /// Holding `admin` grants `admin.organization`; holding
    /// `admin.organization` does not grant `admin`.
    pub fn grants(&self, key: &str) -> bool {
        self.names.iter().any(|held| {
            key == held
                || key
                    .strip_prefix(held.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{HeldPermissions, PermissionSource, Viewer};

    #[test]
    fn grants_exact_and_child_permissions() {
        let held = HeldPermissions::from_names(["admin", "ticket.agent"]);
        assert!(held.grants("admin"));
        assert!(held.grants("admin.organization"));
        assert!(held.grants("ticket.agent"));
        assert!(!held.grants("ticket"));
        assert!(!held.grants("ticket.customer"));
        assert!(!held.grants("administrator"));
    }

    #[test]
    fn ignores_blank_names() {
        let held = HeldPermissions::from_names(["", "  "]);
        assert!(held.is_empty());
    }

    #[test]
    fn viewer_lists_permissions_in_stable_order() {
        let viewer = Viewer::new(["ticket.agent", "admin.organization"]);
        assert_eq!(
            viewer.permissions().expect("static viewer"),
            vec!["admin.organization".to_string(), "ticket.agent".to_string()]
        );
    }
}
