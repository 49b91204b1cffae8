//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and directory calls into use-case level APIs.
//! - Keep boundary layers decoupled from storage details.

pub mod block_service;
