#![deny(missing_docs)]

//! # cmdgw-core — Foundational Types for the Command Gateway
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies — only `serde`, `serde_json`,
//! `thiserror`, and `uuid` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** Every identifier is a
//!    distinct type. You cannot pass a [`RuleId`] where a [`CommandId`] is
//!    expected.
//!
//! 2. **Single [`Role`] enum with a total privilege order.** Authorization
//!    checks compare roles, never strings.
//!
//! 3. **[`ValidationError`] hierarchy.** Structured errors with `thiserror` —
//!    no `Box<dyn Error>`, no `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod role;

// Re-export primary types at crate root for ergonomic imports.
pub use error::ValidationError;
pub use identity::{AuditEntryId, CommandId, RuleId, UserId, VoteId};
pub use role::Role;
