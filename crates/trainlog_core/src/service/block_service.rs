//! Training block lifecycle service.
//!
//! # Responsibility
//! - Orchestrate get/create/update/navigate over the block repository and
//!   the user directory.
//! - Own every consistency and rollback decision for the block aggregate.
//!
//! # Invariants
//! - Service holds no state besides its two collaborators.
//! - `create` is persist -> register -> (on register failure) delete. The
//!   registration error is always the one returned.
//! - `get_day` writes the cursor only after both indices resolve, and returns
//!   the day only after the cursor write succeeded. Only the cursor columns
//!   are written, so a concurrent `update` is never reverted.
//! - A missing block is reported as `NotFound` by every operation.

use crate::model::block::{BlockId, BlockIndexError, Day, DayCursor, TrainingBlock, Week};
use crate::model::user::{BlockRef, User, UserId};
use crate::repo::block_repo::{BlockRepository, RepoError};
use crate::repo::user_repo::{DirectoryError, UserDirectory};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Request model for creating a block.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateBlockRequest {
    pub name: String,
    /// Owner of the new block. `None` or nil is a caller error.
    pub user_id: Option<UserId>,
    /// Initial week/day structure, in order.
    pub weeks: Vec<Week>,
}

/// Request model for replacing a block's name and structure.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBlockRequest {
    /// Target block. `None` or nil is a caller error.
    pub id: Option<BlockId>,
    pub name: String,
    /// New week/day structure. Replaces the stored one entirely.
    pub weeks: Vec<Week>,
}

/// Coarse failure category exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockErrorKind {
    /// Required input missing or malformed. Never retried.
    CallerError,
    /// Referenced user or block does not exist.
    NotFound,
    /// Owner already has a block with this name.
    Conflict,
    /// Block exists but the requested week/day position does not.
    IndexError,
    /// Any other persistence or directory failure.
    Error,
}

impl BlockErrorKind {
    /// Stable code used in logs and by boundary layers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallerError => "caller_error",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::IndexError => "index_error",
            Self::Error => "error",
        }
    }
}

/// Service error for block use-cases.
#[derive(Debug)]
pub enum BlockServiceError {
    /// Required input is missing or blank.
    InvalidInput(&'static str),
    /// No block with this ID.
    BlockNotFound(BlockId),
    /// No block with this name for this user, or the user itself is unknown.
    NamedBlockNotFound { name: String, owner_id: UserId },
    /// Owner of a new block does not exist.
    OwnerNotFound(UserId),
    /// Owner already has a block with this name.
    Conflict { name: String, owner_id: UserId },
    /// Week/day index outside the block structure.
    Index(BlockIndexError),
    Repo(RepoError),
    Directory(DirectoryError),
}

impl BlockServiceError {
    /// Maps this error onto the caller-facing category.
    pub fn kind(&self) -> BlockErrorKind {
        match self {
            Self::InvalidInput(_) => BlockErrorKind::CallerError,
            Self::BlockNotFound(_) | Self::NamedBlockNotFound { .. } | Self::OwnerNotFound(_) => {
                BlockErrorKind::NotFound
            }
            Self::Conflict { .. } => BlockErrorKind::Conflict,
            Self::Index(_) => BlockErrorKind::IndexError,
            Self::Repo(_) | Self::Directory(_) => BlockErrorKind::Error,
        }
    }
}

impl Display for BlockServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::BlockNotFound(id) => write!(f, "training block not found: {id}"),
            Self::NamedBlockNotFound { owner_id, .. } => {
                write!(f, "training block not found for user {owner_id}")
            }
            Self::OwnerNotFound(id) => write!(f, "block owner not found: {id}"),
            Self::Conflict { .. } => write!(f, "blocks cannot have identical names"),
            Self::Index(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Directory(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BlockServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Index(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Directory(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for BlockServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::BlockNotFound(id),
            RepoError::Conflict { owner_id, name } => Self::Conflict { name, owner_id },
            other => Self::Repo(other),
        }
    }
}

impl From<DirectoryError> for BlockServiceError {
    fn from(value: DirectoryError) -> Self {
        Self::Directory(value)
    }
}

impl From<BlockIndexError> for BlockServiceError {
    fn from(value: BlockIndexError) -> Self {
        Self::Index(value)
    }
}

/// Block lifecycle facade over repository and directory implementations.
pub struct BlockService<R: BlockRepository, D: UserDirectory> {
    repo: R,
    directory: D,
}

impl<R: BlockRepository, D: UserDirectory> BlockService<R, D> {
    /// Creates a service from its two collaborators.
    pub fn new(repo: R, directory: D) -> Self {
        Self { repo, directory }
    }

    /// Finds the block `user_id` has named `name`.
    ///
    /// # Contract
    /// - Blank name or nil user ID: `InvalidInput`.
    /// - Unknown user and unknown block both yield `NamedBlockNotFound`.
    /// - Read-only; the cursor is not touched.
    pub fn get(&self, name: &str, user_id: UserId) -> Result<TrainingBlock, BlockServiceError> {
        let started_at = Instant::now();
        let result = self.get_inner(name, user_id);
        log_outcome("block_get", started_at, &format!("user_id={user_id}"), &result);
        result
    }

    /// Finds one block by ID without side effects.
    pub fn get_by_id(&self, id: BlockId) -> Result<TrainingBlock, BlockServiceError> {
        let started_at = Instant::now();
        let result = require_id(Some(id), "block id is required").and_then(|id| self.load(id));
        log_outcome("block_get_by_id", started_at, &format!("block_id={id}"), &result);
        result
    }

    /// Persists a new block and registers it against its owner.
    ///
    /// # Contract
    /// - Missing owner or blank name: `InvalidInput`; nothing is written.
    /// - Unknown owner: `OwnerNotFound`; nothing is written.
    /// - Duplicate name for this owner: `Conflict`; nothing is written.
    /// - Registration failure: the saved block is deleted (best effort) and
    ///   the registration error is returned.
    pub fn create(&self, request: CreateBlockRequest) -> Result<BlockId, BlockServiceError> {
        let started_at = Instant::now();
        let subject = match request.user_id {
            Some(user_id) => format!("user_id={user_id}"),
            None => "user_id=none".to_string(),
        };
        let result = self.create_inner(request);
        match &result {
            Ok(block_id) => log_outcome(
                "block_create",
                started_at,
                &format!("{subject} block_id={block_id}"),
                &result,
            ),
            Err(_) => log_outcome("block_create", started_at, &subject, &result),
        }
        result
    }

    /// Replaces name and week structure of an existing block.
    ///
    /// # Contract
    /// - Missing block ID or blank name: `InvalidInput`.
    /// - Unknown block: `BlockNotFound`.
    /// - Renaming onto another block of the same owner: `Conflict`.
    /// - No merge: the supplied weeks become the whole tree. A cursor that no
    ///   longer fits the new tree is cleared.
    pub fn update(&self, request: UpdateBlockRequest) -> Result<TrainingBlock, BlockServiceError> {
        let started_at = Instant::now();
        let subject = match request.id {
            Some(block_id) => format!("block_id={block_id}"),
            None => "block_id=none".to_string(),
        };
        let result = self.update_inner(request);
        log_outcome("block_update", started_at, &subject, &result);
        result
    }

    /// Returns one day and records it as the block's most recently opened.
    ///
    /// # Contract
    /// - Nil block ID: `InvalidInput`.
    /// - Unknown block: `BlockNotFound`.
    /// - Out-of-range index: `Index`; the stored cursor is unchanged.
    /// - The day is returned only after the cursor was persisted.
    pub fn get_day(
        &self,
        block_id: BlockId,
        week_index: usize,
        day_index: usize,
    ) -> Result<Day, BlockServiceError> {
        let started_at = Instant::now();
        let result = self.get_day_inner(block_id, week_index, day_index);
        log_outcome(
            "block_get_day",
            started_at,
            &format!("block_id={block_id} week_index={week_index} day_index={day_index}"),
            &result,
        );
        result
    }

    fn get_inner(&self, name: &str, user_id: UserId) -> Result<TrainingBlock, BlockServiceError> {
        let name = require_name(name)?;
        let user_id = require_id(Some(user_id), "user id is required")?;
        let not_found = || BlockServiceError::NamedBlockNotFound {
            name: name.to_string(),
            owner_id: user_id,
        };

        let owner = match self.directory.get_by_id(user_id) {
            Ok(owner) => owner,
            Err(err) => {
                debug!("event=block_get module=service status=masked user_id={user_id} error={err}");
                return Err(not_found());
            }
        };

        self.repo
            .find_by_name_and_owner(name, owner.id)?
            .ok_or_else(not_found)
    }

    fn create_inner(&self, request: CreateBlockRequest) -> Result<BlockId, BlockServiceError> {
        let owner_id = require_id(request.user_id, "user id is required")?;
        require_name(&request.name)?;
        let owner = self.resolve_owner(owner_id)?;

        let block = TrainingBlock::new(request.name, owner_id, request.weeks);
        let block_id = self.repo.save(&block)?;

        if let Err(err) = self
            .directory
            .add_block_reference(&owner, BlockRef { block_id })
        {
            self.roll_back_create(block_id);
            return Err(err.into());
        }

        Ok(block_id)
    }

    fn update_inner(
        &self,
        request: UpdateBlockRequest,
    ) -> Result<TrainingBlock, BlockServiceError> {
        let id = require_id(request.id, "block id is required")?;
        require_name(&request.name)?;

        let mut block = self.load(id)?;
        block.replace_structure(request.name, request.weeks);
        self.repo.save(&block)?;
        Ok(block)
    }

    fn get_day_inner(
        &self,
        block_id: BlockId,
        week_index: usize,
        day_index: usize,
    ) -> Result<Day, BlockServiceError> {
        let block_id = require_id(Some(block_id), "block id is required")?;
        let mut block = self.load(block_id)?;
        let day = block.open_day(week_index, day_index)?.clone();
        let cursor = DayCursor {
            week_index,
            day_index,
        };
        self.repo.save_cursor(block_id, cursor)?;
        Ok(day)
    }

    fn load(&self, id: BlockId) -> Result<TrainingBlock, BlockServiceError> {
        self.repo
            .find_by_id(id)?
            .ok_or(BlockServiceError::BlockNotFound(id))
    }

    fn resolve_owner(&self, owner_id: UserId) -> Result<User, BlockServiceError> {
        self.directory.get_by_id(owner_id).map_err(|err| match err {
            DirectoryError::UserNotFound(id) => BlockServiceError::OwnerNotFound(id),
            other => BlockServiceError::Directory(other),
        })
    }

    /// Compensating delete after a failed registration. Failures are logged
    /// and never replace the registration error.
    fn roll_back_create(&self, block_id: BlockId) {
        match self.repo.delete(block_id) {
            Ok(()) => info!(
                "event=block_create_rollback module=service status=ok block_id={block_id}"
            ),
            Err(err) => error!(
                "event=block_create_rollback module=service status=error block_id={block_id} error_code=rollback_failed error={err}"
            ),
        }
    }
}

fn require_id(id: Option<Uuid>, message: &'static str) -> Result<Uuid, BlockServiceError> {
    match id {
        Some(id) if !id.is_nil() => Ok(id),
        _ => Err(BlockServiceError::InvalidInput(message)),
    }
}

fn require_name(name: &str) -> Result<&str, BlockServiceError> {
    if name.trim().is_empty() {
        return Err(BlockServiceError::InvalidInput("block name is required"));
    }
    Ok(name)
}

fn log_outcome<T>(
    event: &str,
    started_at: Instant,
    subject: &str,
    result: &Result<T, BlockServiceError>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!("event={event} module=service status=ok {subject} duration_ms={duration_ms}"),
        Err(err) if err.kind() == BlockErrorKind::Error => error!(
            "event={event} module=service status=error {subject} duration_ms={duration_ms} error_code={} error={err}",
            err.kind().as_str()
        ),
        Err(err) => warn!(
            "event={event} module=service status=error {subject} duration_ms={duration_ms} error_code={}",
            err.kind().as_str()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{BlockErrorKind, BlockServiceError};
    use crate::model::block::BlockIndexError;
    use crate::repo::block_repo::RepoError;
    use uuid::Uuid;

    #[test]
    fn repo_not_found_and_conflict_are_lifted_to_service_kinds() {
        let id = Uuid::new_v4();
        let err = BlockServiceError::from(RepoError::NotFound(id));
        assert!(matches!(err, BlockServiceError::BlockNotFound(found) if found == id));
        assert_eq!(err.kind(), BlockErrorKind::NotFound);

        let err = BlockServiceError::from(RepoError::Conflict {
            owner_id: id,
            name: "Block1".to_string(),
        });
        assert_eq!(err.kind(), BlockErrorKind::Conflict);
    }

    #[test]
    fn other_repo_failures_stay_generic() {
        let err = BlockServiceError::from(RepoError::InvalidData("bad".to_string()));
        assert_eq!(err.kind(), BlockErrorKind::Error);
        assert_eq!(err.kind().as_str(), "error");
    }

    #[test]
    fn index_errors_keep_their_own_kind() {
        let err = BlockServiceError::from(BlockIndexError::WeekOutOfRange { index: 5, len: 2 });
        assert_eq!(err.kind(), BlockErrorKind::IndexError);
        assert!(err.to_string().contains("week index 5"));
    }
}
