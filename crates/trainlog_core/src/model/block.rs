//! Training block aggregate model.
//!
//! # Responsibility
//! - Define the Block -> Week -> Day hierarchy treated as one consistency unit.
//! - Provide indexed descent helpers used by navigation use-cases.
//!
//! # Invariants
//! - `owner_id` is fixed at construction and never reassigned.
//! - Week and day indices are zero-based and must be strictly less than the
//!   length of their containing sequence; out-of-range access is an error.
//! - `cursor`, when set, must point at an existing day when it is written.

use crate::model::user::UserId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a training block, assigned on first persistence.
pub type BlockId = Uuid;
/// Stable identifier of one week inside a block.
pub type WeekId = Uuid;
/// Stable identifier of one day inside a week.
pub type DayId = Uuid;

/// Leaf payload node. Content is opaque to core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    pub id: DayId,
    /// Ordered exercise entries (or similar); never inspected by core.
    #[serde(default)]
    pub entries: Vec<serde_json::Value>,
}

impl Day {
    /// Creates a day with a generated stable ID.
    pub fn new(entries: Vec<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entries,
        }
    }
}

/// Ordered sequence of days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Week {
    pub id: WeekId,
    #[serde(default)]
    pub days: Vec<Day>,
}

impl Week {
    /// Creates a week with a generated stable ID.
    pub fn new(days: Vec<Day>) -> Self {
        Self {
            id: Uuid::new_v4(),
            days,
        }
    }

    /// Returns the day at `index`, failing when the index is out of range.
    ///
    /// `week_index` is only used to describe the failure.
    pub fn day(&self, week_index: usize, index: usize) -> Result<&Day, BlockIndexError> {
        self.days
            .get(index)
            .ok_or(BlockIndexError::DayOutOfRange {
                week_index,
                index,
                len: self.days.len(),
            })
    }
}

/// Last day a caller navigated to, as zero-based `(week, day)` indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCursor {
    pub week_index: usize,
    pub day_index: usize,
}

/// Aggregate root for one user's training program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingBlock {
    /// `None` until the repository assigns an ID on first save.
    pub id: Option<BlockId>,
    /// Unique per owner, not globally.
    pub name: String,
    owner_id: UserId,
    pub weeks: Vec<Week>,
    /// Advisory UI state; unset by default.
    pub cursor: Option<DayCursor>,
}

impl TrainingBlock {
    /// Creates an unsaved block owned by `owner_id`.
    pub fn new(name: impl Into<String>, owner_id: UserId, weeks: Vec<Week>) -> Self {
        Self {
            id: None,
            name: name.into(),
            owner_id,
            weeks,
            cursor: None,
        }
    }

    /// Rebuilds a persisted block. Used by repository read paths.
    pub fn from_parts(
        id: BlockId,
        name: String,
        owner_id: UserId,
        weeks: Vec<Week>,
        cursor: Option<DayCursor>,
    ) -> Self {
        Self {
            id: Some(id),
            name,
            owner_id,
            weeks,
            cursor,
        }
    }

    /// Returns the owning user. Ownership never changes after creation.
    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    /// Returns the week at `index`, failing when the index is out of range.
    pub fn week(&self, index: usize) -> Result<&Week, BlockIndexError> {
        self.weeks.get(index).ok_or(BlockIndexError::WeekOutOfRange {
            index,
            len: self.weeks.len(),
        })
    }

    /// Returns the day at `(week_index, day_index)`.
    pub fn day(&self, week_index: usize, day_index: usize) -> Result<&Day, BlockIndexError> {
        self.week(week_index)?.day(week_index, day_index)
    }

    /// Locates a day and records it as the most recently opened position.
    ///
    /// The cursor is only touched when both indices resolve.
    pub fn open_day(
        &mut self,
        week_index: usize,
        day_index: usize,
    ) -> Result<&Day, BlockIndexError> {
        self.day(week_index, day_index)?;
        self.cursor = Some(DayCursor {
            week_index,
            day_index,
        });
        self.day(week_index, day_index)
    }

    /// Replaces name and the whole week tree.
    ///
    /// A cursor that no longer fits the new structure is cleared; a cursor
    /// that still points at an existing day is kept.
    pub fn replace_structure(&mut self, name: impl Into<String>, weeks: Vec<Week>) {
        self.name = name.into();
        self.weeks = weeks;
        if !self.cursor_in_bounds() {
            self.cursor = None;
        }
    }

    /// Returns whether the cursor is unset or points at an existing day.
    pub fn cursor_in_bounds(&self) -> bool {
        match self.cursor {
            Some(cursor) => self.day(cursor.week_index, cursor.day_index).is_ok(),
            None => true,
        }
    }

    /// Total number of days across all weeks.
    pub fn day_count(&self) -> usize {
        self.weeks.iter().map(|week| week.days.len()).sum()
    }

    /// Validates aggregate invariants before persistence.
    pub fn validate(&self) -> Result<(), BlockValidationError> {
        if self.name.trim().is_empty() {
            return Err(BlockValidationError::BlankName);
        }
        if let Some(cursor) = self.cursor {
            if !self.cursor_in_bounds() {
                return Err(BlockValidationError::CursorOutOfBounds(cursor));
            }
        }
        Ok(())
    }
}

/// Indexed descent into the week/day hierarchy failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIndexError {
    WeekOutOfRange {
        index: usize,
        len: usize,
    },
    DayOutOfRange {
        week_index: usize,
        index: usize,
        len: usize,
    },
}

impl Display for BlockIndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WeekOutOfRange { index, len } => {
                write!(f, "week index {index} out of range (block has {len} weeks)")
            }
            Self::DayOutOfRange {
                week_index,
                index,
                len,
            } => write!(
                f,
                "day index {index} out of range (week {week_index} has {len} days)"
            ),
        }
    }
}

impl Error for BlockIndexError {}

/// Aggregate state that must never be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockValidationError {
    BlankName,
    CursorOutOfBounds(DayCursor),
}

impl Display for BlockValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "block name must not be blank"),
            Self::CursorOutOfBounds(cursor) => write!(
                f,
                "cursor (week {}, day {}) points outside the block",
                cursor.week_index, cursor.day_index
            ),
        }
    }
}

impl Error for BlockValidationError {}
