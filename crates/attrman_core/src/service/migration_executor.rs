//! Migration executor: converges backing schema to pending definitions.
//!
//! # Responsibility
//! - Plan and apply DDL for every definition with `migrated = false`.
//! - Mark applied definitions migrated and delete removed ones.
//! - Exclude concurrent runs through the `schema_migration_lock` row.
//!
//! # Invariants
//! - A run with nothing pending issues no DDL and returns `true`.
//! - Transactional runs apply all or nothing.
//! - Sequential runs commit per definition; a retry resumes at the first
//!   definition still pending.
//! - A definition is only finalized at the revision that was applied.
//! - With `ddl_timeout` set, no statement starts after the deadline and
//!   long statements are interrupted once it passes.

use crate::config::EngineConfig;
use crate::db::DbError;
use crate::model::attribute::AttributeDefinition;
use crate::model::data_option::DataOptionError;
use crate::model::object_type::ObjectType;
use crate::repo::attribute_repo::{AttributeRepository, RepoError, SqliteAttributeRepository};
use crate::schema::planner::{inspect_live, plan};
use log::{error, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// VM instructions between two deadline checks.
const DEADLINE_CHECK_INTERVAL_OPS: i32 = 1_000;

/// Errors from `migration_execute`.
#[derive(Debug)]
pub enum MigrationError {
    /// Another run holds the migration lock. `owner` is unknown when the
    /// database write lock could not be obtained at all.
    AlreadyInProgress { owner: Option<String> },
    /// Persisted data options cannot be mapped to storage.
    InvalidDefinition {
        object_type: ObjectType,
        name: String,
        source: DataOptionError,
    },
    /// A DDL statement failed.
    Ddl {
        object_type: ObjectType,
        name: String,
        statement: String,
        source: DbError,
    },
    /// The run exceeded the configured DDL timeout. Not retryable.
    Timeout {
        timeout: Duration,
        /// `ObjectType.name` being applied, if any.
        attribute: Option<String>,
    },
    Repo(RepoError),
    Db(DbError),
}

impl MigrationError {
    /// Whether retrying the run unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AlreadyInProgress { .. } | Self::Ddl { .. } | Self::Db(_) => true,
            Self::Repo(RepoError::Db(_)) => true,
            Self::Repo(_) | Self::InvalidDefinition { .. } | Self::Timeout { .. } => false,
        }
    }

    /// Stable identifier used in log lines.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyInProgress { .. } => "already_in_progress",
            Self::InvalidDefinition { .. } => "invalid_definition",
            Self::Ddl { .. } => "ddl_failed",
            Self::Timeout { .. } => "timeout",
            Self::Repo(_) => "repo_error",
            Self::Db(_) => "db_error",
        }
    }
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInProgress { owner: Some(owner) } => {
                write!(f, "migration already in progress (owner {owner})")
            }
            Self::AlreadyInProgress { owner: None } => write!(f, "migration already in progress"),
            Self::InvalidDefinition {
                object_type,
                name,
                source,
            } => write!(f, "attribute {object_type}.{name} cannot be migrated: {source}"),
            Self::Ddl {
                object_type,
                name,
                statement,
                source,
            } => write!(
                f,
                "migration of attribute {object_type}.{name} failed at `{statement}`: {source}"
            ),
            Self::Timeout {
                timeout,
                attribute: Some(attribute),
            } => write!(
                f,
                "migration exceeded {} ms while applying {attribute}",
                timeout.as_millis()
            ),
            Self::Timeout {
                timeout,
                attribute: None,
            } => write!(f, "migration exceeded {} ms", timeout.as_millis()),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDefinition { source, .. } => Some(source),
            Self::Ddl { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::AlreadyInProgress { .. } | Self::Timeout { .. } => None,
        }
    }
}

impl From<RepoError> for MigrationError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for MigrationError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for MigrationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Applies pending attribute definitions to the backing schema.
pub struct MigrationExecutor<'conn> {
    conn: &'conn Connection,
    repo: SqliteAttributeRepository<'conn>,
    config: EngineConfig,
}

impl<'conn> MigrationExecutor<'conn> {
    pub fn try_new(conn: &'conn Connection, config: EngineConfig) -> Result<Self, RepoError> {
        Ok(Self {
            conn,
            repo: SqliteAttributeRepository::try_new(conn)?,
            config,
        })
    }

    /// Applies every pending definition.
    ///
    /// Returns `Ok(true)` when the schema matches the catalog afterwards,
    /// including when nothing was pending.
    ///
    /// # Errors
    /// - `AlreadyInProgress` while another run holds the lock.
    /// - `Ddl` with the failing definition and statement.
    /// - `Timeout` when `ddl_timeout` elapses.
    pub fn migration_execute(&self) -> Result<bool, MigrationError> {
        let started_at = Instant::now();
        let mode = if self.config.transactional_ddl {
            "transactional"
        } else {
            "sequential"
        };
        info!("event=migration_execute module=migration status=start mode={mode}");

        let result = self.run_locked();
        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(0) => info!(
                "event=migration_execute module=migration status=skip mode={mode} applied=0 duration_ms={duration_ms}"
            ),
            Ok(applied) => info!(
                "event=migration_execute module=migration status=ok mode={mode} applied={applied} duration_ms={duration_ms}"
            ),
            Err(err) => error!(
                "event=migration_execute module=migration status=error mode={mode} duration_ms={duration_ms} error_code={} retryable={}",
                err.error_code(),
                err.is_retryable()
            ),
        }
        result.map(|_| true)
    }

    fn run_locked(&self) -> Result<usize, MigrationError> {
        let lock = MigrationLock::acquire(self.conn, self.config.lock_stale_after)?;
        let deadline = self
            .config
            .ddl_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let guard = deadline.map(|deadline| DeadlineGuard::arm(self.conn, deadline));

        let result = if self.config.transactional_ddl {
            self.repo
                .write_locked(|repo| self.apply_pending(repo, repo.list_pending()?, deadline))
        } else {
            self.run_sequential(deadline)
        };

        drop(guard);
        let result = result.map_err(|err| self.classify_interrupt(err, None));
        lock.release();
        result
    }

    fn run_sequential(&self, deadline: Option<Instant>) -> Result<usize, MigrationError> {
        let pending = self.repo.list_pending()?;
        let mut applied = 0;
        for definition in pending {
            applied += self
                .repo
                .write_locked(|repo| self.apply_pending(repo, vec![definition], deadline))?;
        }
        Ok(applied)
    }

    fn apply_pending(
        &self,
        repo: &SqliteAttributeRepository<'conn>,
        pending: Vec<AttributeDefinition>,
        deadline: Option<Instant>,
    ) -> Result<usize, MigrationError> {
        let mut applied = 0;
        for definition in &pending {
            self.check_deadline(deadline, definition)?;
            self.apply_definition(definition, deadline)
                .map_err(|err| self.classify_interrupt(err, Some(definition)))?;
            let finalized = if definition.to_delete {
                repo.delete(definition.id, definition.revision)?
            } else {
                repo.mark_migrated(definition.id, definition.revision)?
            };
            if finalized {
                applied += 1;
            } else {
                warn!(
                    "event=migration_finalize module=migration status=skip object_type={} name={} revision={} reason=revision_changed",
                    definition.object_type, definition.name, definition.revision
                );
            }
        }
        Ok(applied)
    }

    fn apply_definition(
        &self,
        definition: &AttributeDefinition,
        deadline: Option<Instant>,
    ) -> Result<(), MigrationError> {
        let live = inspect_live(self.conn, definition)?;
        let operations = plan(definition, &live).map_err(|source| {
            MigrationError::InvalidDefinition {
                object_type: definition.object_type,
                name: definition.name.clone(),
                source,
            }
        })?;

        for operation in &operations {
            for statement in operation.statements() {
                self.check_deadline(deadline, definition)?;
                self.conn.execute_batch(&statement).map_err(|err| {
                    error!(
                        "event=migration_ddl module=migration status=error object_type={} name={} op={} error={err}",
                        definition.object_type,
                        definition.name,
                        operation.kind()
                    );
                    MigrationError::Ddl {
                        object_type: definition.object_type,
                        name: definition.name.clone(),
                        statement: statement.clone(),
                        source: DbError::Sqlite(err),
                    }
                })?;
            }
            info!(
                "event=migration_ddl module=migration status=ok object_type={} name={} op={}",
                definition.object_type,
                definition.name,
                operation.kind()
            );
        }
        Ok(())
    }

    /// Fails with `Timeout` once `deadline` has passed. The progress handler
    /// only fires every `DEADLINE_CHECK_INTERVAL_OPS` instructions, so each
    /// statement is also gated here.
    fn check_deadline(
        &self,
        deadline: Option<Instant>,
        definition: &AttributeDefinition,
    ) -> Result<(), MigrationError> {
        let (Some(deadline), Some(timeout)) = (deadline, self.config.ddl_timeout) else {
            return Ok(());
        };
        if Instant::now() < deadline {
            return Ok(());
        }
        warn!(
            "event=migration_deadline module=migration status=error object_type={} name={} timeout_ms={}",
            definition.object_type,
            definition.name,
            timeout.as_millis()
        );
        Err(MigrationError::Timeout {
            timeout,
            attribute: Some(format!("{}.{}", definition.object_type, definition.name)),
        })
    }

    /// Rewrites errors caused by the deadline handler into `Timeout`.
    fn classify_interrupt(
        &self,
        err: MigrationError,
        definition: Option<&AttributeDefinition>,
    ) -> MigrationError {
        let Some(timeout) = self.config.ddl_timeout else {
            return err;
        };
        if !is_interrupted(&err) {
            return err;
        }
        MigrationError::Timeout {
            timeout,
            attribute: definition.map(|definition| {
                format!("{}.{}", definition.object_type, definition.name)
            }),
        }
    }
}

fn is_interrupted(err: &MigrationError) -> bool {
    match err {
        MigrationError::Ddl { source, .. } | MigrationError::Db(source) => source.is_interrupted(),
        MigrationError::Repo(RepoError::Db(source)) => source.is_interrupted(),
        _ => false,
    }
}

/// Interrupts statements on `conn` once the deadline passes.
struct DeadlineGuard<'conn> {
    conn: &'conn Connection,
}

impl<'conn> DeadlineGuard<'conn> {
    fn arm(conn: &'conn Connection, deadline: Instant) -> Self {
        conn.progress_handler(
            DEADLINE_CHECK_INTERVAL_OPS,
            Some(move || Instant::now() >= deadline),
        );
        Self { conn }
    }
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

/// Ownership of the `schema_migration_lock` row.
struct MigrationLock<'conn> {
    conn: &'conn Connection,
    owner: String,
    released: bool,
}

impl<'conn> MigrationLock<'conn> {
    fn acquire(conn: &'conn Connection, stale_after: Duration) -> Result<Self, MigrationError> {
        let owner = Uuid::new_v4().to_string();
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
            .map_err(|err| busy_as_in_progress(DbError::Sqlite(err)))?;

        let holder: Option<(String, i64)> = tx
            .query_row(
                "SELECT owner, acquired_at FROM schema_migration_lock WHERE id = 1;",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let now_ms = epoch_ms();
        if let Some((holder, acquired_at)) = holder {
            let age_ms = now_ms.saturating_sub(acquired_at);
            if u128::try_from(age_ms).unwrap_or(0) < stale_after.as_millis() {
                return Err(MigrationError::AlreadyInProgress {
                    owner: Some(holder),
                });
            }
            warn!(
                "event=migration_lock module=migration status=ok action=takeover previous_owner={holder} age_ms={age_ms}"
            );
        }

        tx.execute(
            "INSERT OR REPLACE INTO schema_migration_lock (id, owner, acquired_at)
             VALUES (1, ?1, ?2);",
            params![owner.as_str(), now_ms],
        )?;
        tx.commit()
            .map_err(|err| busy_as_in_progress(DbError::Sqlite(err)))?;

        Ok(Self {
            conn,
            owner,
            released: false,
        })
    }

    fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.conn.execute(
            "DELETE FROM schema_migration_lock WHERE id = 1 AND owner = ?1;",
            [self.owner.as_str()],
        ) {
            warn!("event=migration_lock module=migration status=error action=release error={err}");
        }
    }
}

impl Drop for MigrationLock<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn busy_as_in_progress(err: DbError) -> MigrationError {
    if err.is_busy() {
        MigrationError::AlreadyInProgress { owner: None }
    } else {
        MigrationError::Db(err)
    }
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
