//! # Engine Errors
//!
//! Every fallible gateway operation returns [`GatewayError`]. Each variant
//! maps to a stable machine-readable reason code so API clients can branch
//! on `reason_code()` instead of parsing display strings.

use thiserror::Error;

use cmdgw_core::{CommandId, RuleId, UserId, ValidationError};

use crate::command::CommandStatus;

/// A gateway operation failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The referenced user does not exist.
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// The referenced command does not exist.
    #[error("command {0} not found")]
    CommandNotFound(CommandId),

    /// The referenced rule does not exist.
    #[error("rule {0} not found")]
    RuleNotFound(RuleId),

    /// A vote, approval, or rejection targeted a command that is not
    /// awaiting approval.
    #[error("command {command_id} is not pending approval (status: {status})")]
    NotPendingApproval {
        /// The targeted command.
        command_id: CommandId,
        /// Its current status.
        status: CommandStatus,
    },

    /// An approval-time execution would overdraw the submitter's balance.
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        /// Credits the execution would debit.
        required: i64,
        /// The submitter's current balance.
        available: i64,
    },

    /// A rejection was attempted without a reason.
    #[error("a rejection reason is required")]
    EmptyReason,

    /// Input failed domain validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl GatewayError {
    /// Stable machine-readable reason code for API error envelopes.
    pub fn reason_code(&self) -> &'static str {
        match self {
            GatewayError::UserNotFound(_)
            | GatewayError::CommandNotFound(_)
            | GatewayError::RuleNotFound(_) => "NOT_FOUND",
            GatewayError::NotPendingApproval { .. } => "NOT_PENDING_APPROVAL",
            GatewayError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            GatewayError::EmptyReason => "EMPTY_REASON",
            GatewayError::Validation(ValidationError::InvalidPattern { .. }) => "INVALID_PATTERN",
            GatewayError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}
