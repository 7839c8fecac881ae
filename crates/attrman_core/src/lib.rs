//! Attribute definition and schema migration engine.
//!
//! Administrators define custom attributes on core objects at runtime; this
//! crate validates the definitions, keeps the catalog, merges per-viewer
//! screen visibility, and migrates the backing SQLite schema.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schema;
pub mod service;
pub mod visibility;

pub use config::{ConfigError, EngineConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::attribute::{AttributeDefinition, AttributeId, AttributeParams};
pub use model::data_option::DataOption;
pub use model::data_type::DataType;
pub use model::name::{validate_name, NameError};
pub use model::object_type::ObjectType;
pub use model::screen::{EffectiveVisibility, ScreenVisibilityRule, WILDCARD_ROLE};
pub use repo::attribute_repo::{AttributeRepository, RepoError, SqliteAttributeRepository};
pub use service::attribute_service::{AttributeError, AttributeService, AttributeView};
pub use service::migration_executor::{MigrationError, MigrationExecutor};
pub use service::object_manager::ObjectManager;
pub use visibility::merge::VisibilityPolicy;
pub use visibility::viewer::{PermissionLookupError, PermissionSource, Viewer};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
