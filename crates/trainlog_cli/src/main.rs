//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `trainlog_core` linkage independently from any service host.
//! - Optionally open a database and list one user's registered blocks.
//!
//! Usage: `trainlog_cli [DB_PATH [USER_ID]]`. `DB_PATH` falls back to
//! `TRAINLOG_DB`; logging is enabled when `TRAINLOG_LOG_DIR` is set.

use log::info;
use std::process::ExitCode;
use trainlog_core::db::migrations::current_user_version;
use trainlog_core::db::open_db;
use trainlog_core::{
    core_version, init_logging_with, ping, BlockService, LogSettings, SqliteBlockRepository,
    SqliteUserDirectory, UserDirectory,
};
use uuid::Uuid;

const DB_PATH_ENV: &str = "TRAINLOG_DB";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("trainlog_cli error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    if let Some(settings) = LogSettings::from_env()? {
        init_logging_with(&settings)?;
    }

    println!("trainlog_core ping={}", ping());
    println!("trainlog_core version={}", core_version());

    let mut args = std::env::args().skip(1);
    let db_path = args.next().or_else(|| std::env::var(DB_PATH_ENV).ok());
    let Some(db_path) = db_path else {
        return Ok(());
    };

    let conn = open_db(&db_path).map_err(|err| format!("failed to open `{db_path}`: {err}"))?;
    let version = current_user_version(&conn).map_err(|err| err.to_string())?;
    println!("trainlog_core schema_version={version}");
    info!("event=cli_db_ready module=cli status=ok schema_version={version}");

    let Some(user_arg) = args.next() else {
        return Ok(());
    };
    let user_id =
        Uuid::parse_str(&user_arg).map_err(|_| format!("invalid user id `{user_arg}`"))?;

    let repo = SqliteBlockRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let directory = SqliteUserDirectory::try_new(&conn).map_err(|err| err.to_string())?;
    let user = directory
        .get_by_id(user_id)
        .map_err(|err| err.to_string())?;
    let service = BlockService::new(&repo, &directory);

    println!("user {} blocks={}", user.id, user.blocks.len());
    for block_ref in &user.blocks {
        let block = service
            .get_by_id(block_ref.block_id)
            .map_err(|err| format!("{} ({})", err, err.kind().as_str()))?;
        let cursor = block
            .cursor
            .map(|cursor| format!("w{}d{}", cursor.week_index + 1, cursor.day_index + 1))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} name={} weeks={} days={} last_opened={}",
            block_ref.block_id,
            block.name,
            block.weeks.len(),
            block.day_count(),
            cursor
        );
    }

    Ok(())
}
