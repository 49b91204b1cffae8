//! Training block domain model.
//!
//! # Responsibility
//! - Define the Block -> Week -> Day aggregate and its invariants.
//! - Define the user directory read model consumed by block use-cases.
//!
//! # Invariants
//! - Every block belongs to exactly one user for its whole lifetime.
//! - Block name uniqueness is scoped to one owner.

pub mod block;
pub mod user;
