//! Per-viewer screen visibility.
//!
//! # Responsibility
//! - Resolve the permissions held by a viewer through [`PermissionSource`].
//! - Merge wildcard and permission-scoped screen rules into one
//!   [`EffectiveVisibility`](crate::model::screen::EffectiveVisibility).
//!
//! # Invariants
//! - Merging is pure and never mutates definitions.
//! - Permission lookup failures are returned, never replaced by defaults.

pub mod merge;
pub mod precedence;
pub mod viewer;
