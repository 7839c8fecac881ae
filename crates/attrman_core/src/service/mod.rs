//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and schema calls into use-case level APIs.
//! - Keep callers decoupled from SQL and DDL details.

pub mod attribute_service;
pub mod migration_executor;
pub mod object_manager;
