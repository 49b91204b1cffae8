//! Training block repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist whole `TrainingBlock` aggregates keyed by `BlockId`.
//! - Provide the secondary `(owner, name)` lookup.
//! - Surface name collisions for one owner as a distinguished `Conflict`.
//!
//! # Invariants
//! - `save` assigns a fresh ID on insert and replaces the whole row otherwise.
//! - `save_cursor` writes only the cursor columns, checked against the stored
//!   week tree in the same transaction.
//! - Owner is written once on insert and never updated.
//! - The week/day tree is stored as one JSON document per block.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::block::{BlockId, BlockValidationError, DayCursor, TrainingBlock, Week};
use crate::model::user::UserId;
use crate::repo::{check_schema, SchemaMismatch};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const BLOCK_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    owner_uuid,
    weeks_json,
    cursor_week,
    cursor_day
FROM training_blocks";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[(
    "training_blocks",
    &[
        "uuid",
        "name",
        "owner_uuid",
        "weeks_json",
        "cursor_week",
        "cursor_day",
        "updated_at",
    ],
)];

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for block persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Week tree could not be encoded or decoded.
    Serialization(serde_json::Error),
    Validation(BlockValidationError),
    NotFound(BlockId),
    /// Owner already has a block with this name.
    Conflict {
        owner_id: UserId,
        name: String,
    },
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "block weeks serialization failed: {err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "training block not found: {id}"),
            Self::Conflict { owner_id, .. } => {
                write!(f, "user {owner_id} already has a block with this name")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "block repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "block repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "block repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted block data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl From<BlockValidationError> for RepoError {
    fn from(value: BlockValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Aggregate repository for training blocks.
pub trait BlockRepository {
    /// Loads one block by ID.
    fn find_by_id(&self, id: BlockId) -> RepoResult<Option<TrainingBlock>>;
    /// Loads the block `owner_id` has named `name`.
    fn find_by_name_and_owner(
        &self,
        name: &str,
        owner_id: UserId,
    ) -> RepoResult<Option<TrainingBlock>>;
    /// Inserts (`id == None`) or replaces the whole aggregate.
    ///
    /// Returns the assigned or existing ID, `Conflict` on a duplicate name
    /// for the same owner and `NotFound` when replacing a missing block.
    fn save(&self, block: &TrainingBlock) -> RepoResult<BlockId>;
    /// Records `cursor` as the last opened day without touching name or weeks.
    ///
    /// `NotFound` when the block is missing; `Validation` when the cursor does
    /// not address a day of the stored structure.
    fn save_cursor(&self, id: BlockId, cursor: DayCursor) -> RepoResult<()>;
    /// Hard-deletes one block.
    fn delete(&self, id: BlockId) -> RepoResult<()>;
}

impl<T: BlockRepository + ?Sized> BlockRepository for &T {
    fn find_by_id(&self, id: BlockId) -> RepoResult<Option<TrainingBlock>> {
        (**self).find_by_id(id)
    }

    fn find_by_name_and_owner(
        &self,
        name: &str,
        owner_id: UserId,
    ) -> RepoResult<Option<TrainingBlock>> {
        (**self).find_by_name_and_owner(name, owner_id)
    }

    fn save(&self, block: &TrainingBlock) -> RepoResult<BlockId> {
        (**self).save(block)
    }

    fn save_cursor(&self, id: BlockId, cursor: DayCursor) -> RepoResult<()> {
        (**self).save_cursor(id, cursor)
    }

    fn delete(&self, id: BlockId) -> RepoResult<()> {
        (**self).delete(id)
    }
}

/// SQLite-backed block repository.
pub struct SqliteBlockRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBlockRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        if let Some(mismatch) = check_schema(conn, REQUIRED_SCHEMA)? {
            return Err(schema_error(mismatch));
        }
        Ok(Self { conn })
    }

    /// Counts blocks owned by `owner_id`.
    pub fn count_for_owner(&self, owner_id: UserId) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM training_blocks WHERE owner_uuid = ?1;",
            [owner_id.to_string()],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative block count `{count}`")))
    }

    fn insert(&self, block: &TrainingBlock, weeks_json: &str) -> RepoResult<BlockId> {
        let (cursor_week, cursor_day) = cursor_to_db(block.cursor)?;
        let owner_text = block.owner_id().to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let taken: i64 = tx.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM training_blocks
                WHERE owner_uuid = ?1 AND name = ?2
            );",
            params![owner_text.as_str(), block.name.as_str()],
            |row| row.get(0),
        )?;
        if taken == 1 {
            return Err(conflict(block));
        }

        let id = Uuid::new_v4();
        let inserted = tx.execute(
            "INSERT INTO training_blocks (
                uuid,
                name,
                owner_uuid,
                weeks_json,
                cursor_week,
                cursor_day
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                block.name.as_str(),
                owner_text.as_str(),
                weeks_json,
                cursor_week,
                cursor_day,
            ],
        );
        map_write_result(inserted, block)?;

        tx.commit()?;
        Ok(id)
    }

    fn replace(&self, id: BlockId, block: &TrainingBlock, weeks_json: &str) -> RepoResult<BlockId> {
        let (cursor_week, cursor_day) = cursor_to_db(block.cursor)?;
        let updated = self.conn.execute(
            "UPDATE training_blocks
             SET
                name = ?1,
                weeks_json = ?2,
                cursor_week = ?3,
                cursor_day = ?4,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?5;",
            params![
                block.name.as_str(),
                weeks_json,
                cursor_week,
                cursor_day,
                id.to_string(),
            ],
        );

        if map_write_result(updated, block)? == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(id)
    }
}

impl BlockRepository for SqliteBlockRepository<'_> {
    fn find_by_id(&self, id: BlockId) -> RepoResult<Option<TrainingBlock>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BLOCK_SELECT_SQL} WHERE uuid = ?1;"))?;
        stmt.query_row([id.to_string()], RawBlockRow::from_row)
            .optional()?
            .map(RawBlockRow::into_block)
            .transpose()
    }

    fn find_by_name_and_owner(
        &self,
        name: &str,
        owner_id: UserId,
    ) -> RepoResult<Option<TrainingBlock>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BLOCK_SELECT_SQL} WHERE owner_uuid = ?1 AND name = ?2;"
        ))?;
        stmt.query_row(params![owner_id.to_string(), name], RawBlockRow::from_row)
            .optional()?
            .map(RawBlockRow::into_block)
            .transpose()
    }

    fn save(&self, block: &TrainingBlock) -> RepoResult<BlockId> {
        block.validate()?;
        let weeks_json = serde_json::to_string(&block.weeks)?;

        match block.id {
            None => self.insert(block, &weeks_json),
            Some(id) => self.replace(id, block, &weeks_json),
        }
    }

    fn save_cursor(&self, id: BlockId, cursor: DayCursor) -> RepoResult<()> {
        let (cursor_week, cursor_day) = cursor_to_db(Some(cursor))?;
        let id_text = id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let weeks_json: Option<String> = tx
            .query_row(
                "SELECT weeks_json FROM training_blocks WHERE uuid = ?1;",
                [id_text.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(weeks_json) = weeks_json else {
            return Err(RepoError::NotFound(id));
        };
        let weeks: Vec<Week> = serde_json::from_str(&weeks_json)?;
        let addressable = weeks
            .get(cursor.week_index)
            .is_some_and(|week| cursor.day_index < week.days.len());
        if !addressable {
            return Err(BlockValidationError::CursorOutOfBounds(cursor).into());
        }

        tx.execute(
            "UPDATE training_blocks
             SET
                cursor_week = ?1,
                cursor_day = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?3;",
            params![cursor_week, cursor_day, id_text.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, id: BlockId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM training_blocks WHERE uuid = ?1;",
            [id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }
}

/// Column values as stored, before uuid/JSON/cursor parsing.
struct RawBlockRow {
    uuid: String,
    name: String,
    owner_uuid: String,
    weeks_json: String,
    cursor_week: Option<i64>,
    cursor_day: Option<i64>,
}

impl RawBlockRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uuid: row.get("uuid")?,
            name: row.get("name")?,
            owner_uuid: row.get("owner_uuid")?,
            weeks_json: row.get("weeks_json")?,
            cursor_week: row.get("cursor_week")?,
            cursor_day: row.get("cursor_day")?,
        })
    }

    fn into_block(self) -> RepoResult<TrainingBlock> {
        let id = parse_uuid(&self.uuid, "training_blocks.uuid")?;
        let owner_id = parse_uuid(&self.owner_uuid, "training_blocks.owner_uuid")?;
        let weeks: Vec<Week> = serde_json::from_str(&self.weeks_json)?;
        let cursor = cursor_from_db(self.cursor_week, self.cursor_day)?;

        let block = TrainingBlock::from_parts(id, self.name, owner_id, weeks, cursor);
        block.validate()?;
        Ok(block)
    }
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn cursor_to_db(cursor: Option<DayCursor>) -> RepoResult<(Option<i64>, Option<i64>)> {
    let Some(cursor) = cursor else {
        return Ok((None, None));
    };
    let to_i64 = |value: usize| {
        i64::try_from(value)
            .map_err(|_| RepoError::InvalidData(format!("cursor index `{value}` overflows i64")))
    };
    Ok((
        Some(to_i64(cursor.week_index)?),
        Some(to_i64(cursor.day_index)?),
    ))
}

fn cursor_from_db(week: Option<i64>, day: Option<i64>) -> RepoResult<Option<DayCursor>> {
    let to_usize = |value: i64, column: &str| {
        usize::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!("invalid cursor index `{value}` in {column}"))
        })
    };
    match (week, day) {
        (None, None) => Ok(None),
        (Some(week), Some(day)) => Ok(Some(DayCursor {
            week_index: to_usize(week, "training_blocks.cursor_week")?,
            day_index: to_usize(day, "training_blocks.cursor_day")?,
        })),
        _ => Err(RepoError::InvalidData(
            "half-set cursor in training_blocks.cursor_week/cursor_day".to_string(),
        )),
    }
}

fn conflict(block: &TrainingBlock) -> RepoError {
    RepoError::Conflict {
        owner_id: block.owner_id(),
        name: block.name.clone(),
    }
}

fn map_write_result(result: rusqlite::Result<usize>, block: &TrainingBlock) -> RepoResult<usize> {
    result.map_err(|err| {
        let err = DbError::from(err);
        if err.is_unique_violation() {
            conflict(block)
        } else {
            RepoError::Db(err)
        }
    })
}

fn schema_error(mismatch: SchemaMismatch) -> RepoError {
    match mismatch {
        SchemaMismatch::Version { expected, actual } => RepoError::UninitializedConnection {
            expected_version: expected,
            actual_version: actual,
        },
        SchemaMismatch::MissingTable(table) => RepoError::MissingRequiredTable(table),
        SchemaMismatch::MissingColumn { table, column } => {
            RepoError::MissingRequiredColumn { table, column }
        }
    }
}
