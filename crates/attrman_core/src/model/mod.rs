//! Attribute catalog domain model.
//!
//! # Responsibility
//! - Define object types, the data type registry, attribute definitions,
//!   and screen visibility records.
//! - Validate attribute names before anything reaches storage.

pub mod attribute;
pub mod data_option;
pub mod data_type;
pub mod name;
pub mod object_type;
pub mod screen;
