//! # API Route Modules
//!
//! Route modules for the gateway API surface:
//!
//! - `commands` — command submission and queries (the admission pipeline).
//! - `approvals` — the approval queue: voting, manual approval, rejection
//!   (admin only).
//! - `rules` — rule CRUD and conflict probing (admin only).
//! - `admin` — user registration, credit adjustments, and the audit log.

pub mod admin;
pub mod approvals;
pub mod commands;
pub mod rules;
