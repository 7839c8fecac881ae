//! Backing schema of custom attributes.
//!
//! # Responsibility
//! - Model DDL operations and render them as SQLite statements.
//! - Inspect live columns and lookup tables.
//! - Plan the operations that converge the live schema to a definition.
//!
//! # Invariants
//! - Planning against a converged schema yields no operations.
//! - Identifiers are always quoted; literals are always escaped.

pub mod ddl;
pub mod inspect;
pub mod planner;
