//! User directory read model.
//!
//! Only the slice of a user account that block use-cases consume: identity
//! and the ordered list of owned block references.

use crate::model::block::BlockId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a user account.
pub type UserId = Uuid;

/// Owner-side pointer to one training block.
///
/// Holds identity only; the current name is read from the block itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub block_id: BlockId,
}

/// User account as seen by block use-cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    /// Registered blocks in registration order.
    pub blocks: Vec<BlockRef>,
}

impl User {
    /// Returns whether `block_id` is registered against this user.
    pub fn owns_block(&self, block_id: BlockId) -> bool {
        self.blocks.iter().any(|block| block.block_id == block_id)
    }
}
