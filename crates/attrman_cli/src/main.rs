//! Operator entry point for attribute schema migrations.
//!
//! # Responsibility
//! - Report pending attribute definitions of a database file.
//! - Run `migration_execute` from deploy hooks.
//!
//! Exit codes: 0 success, 1 failure, 2 usage error.

use attrman_core::db::open_db_with_timeout;
use attrman_core::{
    default_log_level, init_logging, AttributeDefinition, EngineConfig, ObjectManager,
};
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

const ENV_LOG_DIR: &str = "ATTRMAN_LOG_DIR";
const ENV_LOG_LEVEL: &str = "ATTRMAN_LOG_LEVEL";

#[derive(Parser, Debug)]
#[command(name = "attrman", version, about = "Custom attribute schema migrations")]
struct Cli {
    /// SQLite database file
    database: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// List definitions waiting for migration
    Pending,
    /// Apply all pending definitions
    Migrate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_file_logging();

    match run(&cli) {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("attrman: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_file_logging() {
    let Ok(log_dir) = std::env::var(ENV_LOG_DIR) else {
        return;
    };
    let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| default_log_level().to_string());
    if let Err(err) = init_logging(&level, &log_dir) {
        eprintln!("attrman: logging disabled: {err}");
    }
}

fn run(cli: &Cli) -> Result<Vec<String>, Box<dyn Error>> {
    let config = EngineConfig::from_env()?;
    let conn = open_db_with_timeout(&cli.database, config.busy_timeout)?;
    let manager = ObjectManager::try_new(&conn, config)?;

    match cli.command {
        Command::Pending => {
            let pending = manager.list_pending()?;
            if pending.is_empty() {
                return Ok(vec!["nothing pending".to_string()]);
            }
            Ok(pending.iter().map(describe_pending).collect())
        }
        Command::Migrate => {
            manager.migration_execute()?;
            Ok(vec!["schema up to date".to_string()])
        }
    }
}

fn describe_pending(definition: &AttributeDefinition) -> String {
    let action = if definition.to_delete { "remove" } else { "apply" };
    format!(
        "{}.{} {} revision={} action={action}",
        definition.object_type, definition.name, definition.data_type, definition.revision
    )
}
