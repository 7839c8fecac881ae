//! Object manager facade.
//!
//! Bundles the attribute store and the migration executor over one
//! connection and one [`EngineConfig`].

use crate::config::EngineConfig;
use crate::model::attribute::{AttributeDefinition, AttributeParams};
use crate::model::object_type::ObjectType;
use crate::model::screen::EffectiveVisibility;
use crate::repo::attribute_repo::{RepoError, SqliteAttributeRepository};
use crate::service::attribute_service::{AttributeError, AttributeService, AttributeView};
use crate::service::migration_executor::{MigrationError, MigrationExecutor};
use crate::visibility::viewer::PermissionSource;
use rusqlite::Connection;

/// Entry point for application callers.
pub struct ObjectManager<'conn> {
    config: EngineConfig,
    attributes: AttributeService<SqliteAttributeRepository<'conn>>,
    executor: MigrationExecutor<'conn>,
}

impl<'conn> ObjectManager<'conn> {
    /// Applies `config.busy_timeout` to `conn` and wires both services.
    pub fn try_new(conn: &'conn Connection, config: EngineConfig) -> Result<Self, RepoError> {
        conn.busy_timeout(config.busy_timeout)?;
        let attributes = AttributeService::new(
            SqliteAttributeRepository::try_new(conn)?,
            config.visibility_policy,
        );
        let executor = MigrationExecutor::try_new(conn, config.clone())?;
        Ok(Self {
            config,
            attributes,
            executor,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn attributes(&self) -> &AttributeService<SqliteAttributeRepository<'conn>> {
        &self.attributes
    }

    pub fn add(
        &self,
        object_type: ObjectType,
        params: AttributeParams,
    ) -> Result<AttributeDefinition, AttributeError> {
        self.attributes.add(object_type, params)
    }

    pub fn remove(
        &self,
        object_type: ObjectType,
        name: &str,
    ) -> Result<AttributeDefinition, AttributeError> {
        self.attributes.remove(object_type, name)
    }

    pub fn get(
        &self,
        object_type: ObjectType,
        name: &str,
    ) -> Result<Option<AttributeDefinition>, AttributeError> {
        self.attributes.get(object_type, name)
    }

    pub fn list(&self, object_type: ObjectType) -> Result<Vec<AttributeDefinition>, AttributeError> {
        self.attributes.list(object_type)
    }

    pub fn list_pending(&self) -> Result<Vec<AttributeDefinition>, AttributeError> {
        self.attributes.list_pending()
    }

    pub fn pending_migration(&self) -> Result<bool, AttributeError> {
        self.attributes.pending_migration()
    }

    pub fn by_object(
        &self,
        object_type: ObjectType,
        viewer: &impl PermissionSource,
    ) -> Result<Vec<AttributeView>, AttributeError> {
        self.attributes.by_object(object_type, viewer)
    }

    pub fn effective_visibility(
        &self,
        object_type: ObjectType,
        name: &str,
        screen: &str,
        viewer: &impl PermissionSource,
    ) -> Result<EffectiveVisibility, AttributeError> {
        self.attributes
            .effective_visibility(object_type, name, screen, viewer)
    }

    pub fn migration_execute(&self) -> Result<bool, MigrationError> {
        self.executor.migration_execute()
    }
}
