//! Core domain logic for trainlog.
//! This crate is the single source of truth for training block invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LogSettings,
};
pub use model::block::{
    BlockId, BlockIndexError, BlockValidationError, Day, DayCursor, DayId, TrainingBlock, Week,
    WeekId,
};
pub use model::user::{BlockRef, User, UserId};
pub use repo::block_repo::{BlockRepository, RepoError, RepoResult, SqliteBlockRepository};
pub use repo::user_repo::{DirectoryError, DirectoryResult, SqliteUserDirectory, UserDirectory};
pub use service::block_service::{
    BlockErrorKind, BlockService, BlockServiceError, CreateBlockRequest, UpdateBlockRequest,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
