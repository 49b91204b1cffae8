//! User directory contract and SQLite implementation.
//!
//! # Responsibility
//! - Resolve users by ID for block use-cases.
//! - Append block references to a user's ordered block list.
//!
//! # Invariants
//! - Block references keep registration order (`position ASC`).
//! - Registering the same block twice for one user is rejected by storage.

use crate::db::DbError;
use crate::model::user::{BlockRef, User, UserId};
use crate::repo::{check_schema, SchemaMismatch};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    ("users", &["uuid", "email", "display_name"]),
    ("user_blocks", &["user_uuid", "block_uuid", "position"]),
];

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Error from user directory operations.
#[derive(Debug)]
pub enum DirectoryError {
    Db(DbError),
    UserNotFound(UserId),
    /// Email is blank or already registered.
    InvalidEmail(String),
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

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UserNotFound(id) => write!(f, "user not found: {id}"),
            Self::InvalidEmail(reason) => write!(f, "invalid email: {reason}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "user directory requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "user directory requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "user directory requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
        }
    }
}

impl Error for DirectoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for DirectoryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for DirectoryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Capabilities block use-cases need from the user account subsystem.
pub trait UserDirectory {
    /// Resolves one user, failing with `UserNotFound` when absent.
    fn get_by_id(&self, user_id: UserId) -> DirectoryResult<User>;
    /// Appends `block` to the end of `user`'s block list.
    fn add_block_reference(&self, user: &User, block: BlockRef) -> DirectoryResult<()>;
}

impl<T: UserDirectory + ?Sized> UserDirectory for &T {
    fn get_by_id(&self, user_id: UserId) -> DirectoryResult<User> {
        (**self).get_by_id(user_id)
    }

    fn add_block_reference(&self, user: &User, block: BlockRef) -> DirectoryResult<()> {
        (**self).add_block_reference(user, block)
    }
}

/// SQLite-backed user directory.
pub struct SqliteUserDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserDirectory<'conn> {
    /// Constructs a directory from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> DirectoryResult<Self> {
        if let Some(mismatch) = check_schema(conn, REQUIRED_SCHEMA)? {
            return Err(schema_error(mismatch));
        }
        Ok(Self { conn })
    }

    /// Registers a new user account and returns it.
    ///
    /// Account management belongs to the user subsystem; this exists for
    /// seeding local databases and tests.
    pub fn create_user(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> DirectoryResult<User> {
        let email = email.trim();
        if email.is_empty() {
            return Err(DirectoryError::InvalidEmail("email must not be blank".to_string()));
        }

        let id = Uuid::new_v4();
        let inserted = self.conn.execute(
            "INSERT INTO users (uuid, email, display_name) VALUES (?1, ?2, ?3);",
            params![id.to_string(), email, display_name],
        );
        if let Err(err) = inserted {
            let err = DbError::from(err);
            if err.is_unique_violation() {
                return Err(DirectoryError::InvalidEmail(format!(
                    "email `{email}` is already registered"
                )));
            }
            return Err(err.into());
        }

        Ok(User {
            id,
            email: email.to_string(),
            display_name: display_name.map(str::to_string),
            blocks: Vec::new(),
        })
    }

    fn load_block_refs(&self, user_uuid: &str) -> DirectoryResult<Vec<BlockRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT block_uuid
             FROM user_blocks
             WHERE user_uuid = ?1
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query([user_uuid])?;
        let mut blocks = Vec::new();
        while let Some(row) = rows.next()? {
            let block_uuid: String = row.get("block_uuid")?;
            blocks.push(BlockRef {
                block_id: parse_uuid(&block_uuid, "user_blocks.block_uuid")?,
            });
        }
        Ok(blocks)
    }
}

impl UserDirectory for SqliteUserDirectory<'_> {
    fn get_by_id(&self, user_id: UserId) -> DirectoryResult<User> {
        let user_uuid = user_id.to_string();
        let row = self
            .conn
            .query_row(
                "SELECT email, display_name FROM users WHERE uuid = ?1;",
                [user_uuid.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>("email")?,
                        row.get::<_, Option<String>>("display_name")?,
                    ))
                },
            )
            .optional()?;

        let Some((email, display_name)) = row else {
            return Err(DirectoryError::UserNotFound(user_id));
        };

        Ok(User {
            id: user_id,
            email,
            display_name,
            blocks: self.load_block_refs(&user_uuid)?,
        })
    }

    fn add_block_reference(&self, user: &User, block: BlockRef) -> DirectoryResult<()> {
        let user_uuid = user.id.to_string();
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE uuid = ?1);",
            [user_uuid.as_str()],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(DirectoryError::UserNotFound(user.id));
        }

        let next_position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM user_blocks WHERE user_uuid = ?1;",
            [user_uuid.as_str()],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO user_blocks (user_uuid, block_uuid, position)
             VALUES (?1, ?2, ?3);",
            params![user_uuid.as_str(), block.block_id.to_string(), next_position],
        )?;

        Ok(())
    }
}

fn parse_uuid(value: &str, column: &str) -> DirectoryResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        DirectoryError::InvalidData(format!("invalid uuid value `{value}` in {column}"))
    })
}

fn schema_error(mismatch: SchemaMismatch) -> DirectoryError {
    match mismatch {
        SchemaMismatch::Version { expected, actual } => DirectoryError::UninitializedConnection {
            expected_version: expected,
            actual_version: actual,
        },
        SchemaMismatch::MissingTable(table) => DirectoryError::MissingRequiredTable(table),
        SchemaMismatch::MissingColumn { table, column } => {
            DirectoryError::MissingRequiredColumn { table, column }
        }
    }
}
