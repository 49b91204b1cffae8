//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the aggregate repository and user directory contracts consumed
//!   by block use-cases.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes must enforce `TrainingBlock::validate()` first.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod block_repo;
pub mod user_repo;

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbResult;
use rusqlite::Connection;

/// Why a connection was refused by a repository constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchemaMismatch {
    Version { expected: u32, actual: u32 },
    MissingTable(&'static str),
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// Checks that `conn` is migrated and carries the listed tables/columns.
pub(crate) fn check_schema(
    conn: &Connection,
    required: &[(&'static str, &[&'static str])],
) -> DbResult<Option<SchemaMismatch>> {
    let actual = current_user_version(conn)?;
    let expected = latest_version();
    if actual != expected {
        return Ok(Some(SchemaMismatch::Version { expected, actual }));
    }

    for &(table, columns) in required {
        if !table_exists(conn, table)? {
            return Ok(Some(SchemaMismatch::MissingTable(table)));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Ok(Some(SchemaMismatch::MissingColumn { table, column }));
            }
        }
    }

    Ok(None)
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
