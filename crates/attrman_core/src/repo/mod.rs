//! Repository layer for the attribute catalog.
//!
//! # Responsibility
//! - Define use-case oriented catalog access contracts.
//! - Keep SQL details out of services.
//!
//! # Invariants
//! - Writes persist definitions that services already validated.
//! - Repository APIs return semantic errors (`NotFound`) in addition to
//!   storage errors.

pub mod attribute_repo;
