#![deny(missing_docs)]

//! # cmdgw-engine — Command Gateway Engine
//!
//! The gateway's domain logic: users and their credit ledger, the command
//! admission pipeline, the human approval and voting flow, timeout
//! escalation, and a tamper-evident audit log.
//!
//! ## Transactional Boundary
//!
//! Every table lives behind one [`CommandGateway`] lock, and each public
//! operation runs its whole read-validate-write sequence inside a single
//! critical section. That is the concurrency contract the admission
//! pipeline relies on: the balance check and the debit commit together, two
//! racing submissions cannot both pass the check, and an escalation sweep
//! cannot interleave with an approval of the same command.
//!
//! All state-changing operations take the clock as an argument so callers
//! (and tests) control time.

pub mod admission;
pub mod approvals;
pub mod audit;
pub mod command;
pub mod error;
pub mod escalation;
pub mod ledger;
pub mod store;
pub mod user;

pub use admission::{
    SubmissionOutcome, REASON_INSUFFICIENT_CREDITS, REASON_MATCHED_AUTO_REJECT, REASON_UNMATCHED,
};
pub use approvals::{PendingApproval, Vote, VoteCounts, VoteOutcome, VoteType};
pub use audit::{AuditEntry, AuditEventType, AuditQuery};
pub use command::{CommandRecord, CommandStatus};
pub use error::GatewayError;
pub use escalation::REASON_ESCALATION_TIMEOUT;
pub use ledger::CreditEntry;
pub use store::{CommandGateway, RuleUpdate};
pub use user::{User, UserWithBalance};
