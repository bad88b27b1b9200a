//! # Command Records
//!
//! A [`CommandRecord`] is the full lifecycle state of one submitted command.
//! Status is a validated enum rather than a typestate: records cross the
//! API boundary as data, so the enum plus the terminal-status check is the
//! enforceable contract.
//!
//! ```text
//!               ┌─> executed        (terminal)
//! pending ──────┤
//!               ├─> rejected        (terminal)
//!               └─> needs_approval ──> executed | rejected
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cmdgw_core::{CommandId, RuleId, UserId};
use cmdgw_rules::EscalationAction;

/// Lifecycle status of a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Accepted for processing, outcome not yet decided.
    Pending,
    /// Parked for human approval or voting.
    NeedsApproval,
    /// Executed (mocked). Terminal.
    Executed,
    /// Rejected. Terminal.
    Rejected,
}

impl CommandStatus {
    /// Whether this status permits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Rejected)
    }

    /// Stable string form used in audit details and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::NeedsApproval => "needs_approval",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full lifecycle state of one submitted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Unique command identifier.
    pub id: CommandId,
    /// The submitter.
    pub user_id: UserId,
    /// The free-text command as submitted.
    pub command_text: String,
    /// Current lifecycle status.
    pub status: CommandStatus,
    /// The rule that decided this command, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<RuleId>,
    /// Credits this command debits on execution.
    pub cost: i64,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Execution time, for executed commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    /// Why the command was rejected, for rejected commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Mocked execution output, for executed commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// When an unhandled approval request escalates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_at: Option<DateTime<Utc>>,
    /// Whether the escalation sweep has already processed this command.
    #[serde(default)]
    pub escalated: bool,
    /// The escalation action that was applied, once escalated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_action: Option<EscalationAction>,
    /// Who approved or rejected the command, for moderated outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<UserId>,
    /// Approval time, for approved commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// The approver's stated reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_reason: Option<String>,
    /// Approve-vote count that auto-approves this command, copied from the
    /// matching rule at submission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_threshold: Option<u32>,
}

impl CommandRecord {
    /// A fresh record in `pending` status; the admission pipeline decides
    /// the real outcome before the record is stored.
    pub fn new(user_id: UserId, command_text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: CommandId::new(),
            user_id,
            command_text: command_text.into(),
            status: CommandStatus::Pending,
            matched_rule_id: None,
            cost: cmdgw_rules::DEFAULT_COMMAND_COST,
            created_at: now,
            executed_at: None,
            rejection_reason: None,
            output: None,
            escalation_at: None,
            escalated: false,
            escalation_action: None,
            approver_id: None,
            approved_at: None,
            approval_reason: None,
            voting_threshold: None,
        }
    }
}
