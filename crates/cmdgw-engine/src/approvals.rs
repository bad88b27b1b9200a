//! # Approval and Voting Flow
//!
//! Commands parked in `needs_approval` wait for a human decision: an
//! approver acts directly, or members vote and a threshold tips the command
//! into approval automatically, attributed to the tipping voter.
//!
//! One vote per (command, voter): re-voting replaces the earlier vote. A
//! tipping vote and the approval it triggers commit atomically — if the
//! triggered execution would overdraw the submitter, the whole call fails
//! and the vote is not recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use cmdgw_core::{CommandId, UserId, VoteId};

use crate::audit::AuditEventType;
use crate::command::{CommandRecord, CommandStatus};
use crate::error::GatewayError;
use crate::store::{CommandGateway, GatewayInner};

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

/// The direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    /// In favor of executing the command.
    Approve,
    /// Against executing the command.
    Reject,
}

impl VoteType {
    /// Stable string form used in audit details and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Approve => "approve",
            VoteType::Reject => "reject",
        }
    }
}

/// One user's current vote on one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Unique vote identifier; stable across re-votes.
    pub id: VoteId,
    /// The command voted on.
    pub command_id: CommandId,
    /// The voter.
    pub user_id: UserId,
    /// Current direction.
    pub vote_type: VoteType,
    /// When the vote was first cast or last changed.
    pub created_at: DateTime<Utc>,
}

/// Tally of the current votes on a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    /// Votes in favor.
    pub approve: u32,
    /// Votes against.
    pub reject: u32,
    /// All votes.
    pub total: u32,
}

/// The result of casting a vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteOutcome {
    /// The stored vote's identifier.
    pub vote_id: VoteId,
    /// Tally after this vote.
    pub counts: VoteCounts,
    /// Whether this vote tipped the command into approval.
    pub auto_approved: bool,
}

/// A pending command joined with its current tally, for the approval queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    /// The pending command.
    pub command: CommandRecord,
    /// Its current votes.
    pub votes: VoteCounts,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl CommandGateway {
    /// Cast or replace a vote on a pending command.
    ///
    /// When the record carries a voting threshold and the approve tally
    /// reaches it, the approval path runs immediately, attributed to this
    /// voter.
    pub fn cast_vote(
        &self,
        command_id: CommandId,
        voter_id: UserId,
        vote_type: VoteType,
        now: DateTime<Utc>,
    ) -> Result<VoteOutcome, GatewayError> {
        let outcome = self.write(|inner| {
            inner.require_user(voter_id)?;
            let command = inner
                .commands
                .get(&command_id)
                .ok_or(GatewayError::CommandNotFound(command_id))?;
            if command.status != CommandStatus::NeedsApproval {
                return Err(GatewayError::NotPendingApproval {
                    command_id,
                    status: command.status,
                });
            }
            let threshold = command.voting_threshold;
            let submitter = command.user_id;
            let cost = command.cost;

            // Tally with this vote applied, before writing anything, so a
            // failed threshold approval leaves no trace.
            let counts = prospective_counts(inner, command_id, voter_id, vote_type);
            let tips = threshold.map_or(false, |t| counts.approve >= t);
            if tips {
                let balance = inner.balance_of(submitter);
                if balance < cost {
                    return Err(GatewayError::InsufficientCredits {
                        required: cost,
                        available: balance,
                    });
                }
            }

            let vote_id = match inner.votes.get_mut(&(command_id, voter_id)) {
                Some(existing) => {
                    existing.vote_type = vote_type;
                    existing.created_at = now;
                    existing.id
                }
                None => {
                    let vote = Vote {
                        id: VoteId::new(),
                        command_id,
                        user_id: voter_id,
                        vote_type,
                        created_at: now,
                    };
                    let id = vote.id;
                    inner.votes.insert((command_id, voter_id), vote);
                    id
                }
            };

            let mut auto_approved = false;
            if tips {
                let threshold = threshold.unwrap_or(0);
                let reason = format!(
                    "Auto-approved: {} approve votes reached threshold of {}",
                    counts.approve, threshold
                );
                approve_locked(inner, command_id, voter_id, Some(reason), now)?;
                auto_approved = true;
            }

            inner.record(
                voter_id,
                Some(command_id),
                AuditEventType::VoteCast,
                serde_json::json!({
                    "vote_type": vote_type.as_str(),
                    "approve_count": counts.approve,
                    "reject_count": counts.reject,
                    "auto_approved": auto_approved,
                }),
                now,
            );

            Ok(VoteOutcome {
                vote_id,
                counts,
                auto_approved,
            })
        })?;

        info!(
            command_id = %command_id,
            voter_id = %voter_id,
            vote = vote_type.as_str(),
            auto_approved = outcome.auto_approved,
            "vote cast"
        );
        Ok(outcome)
    }

    /// Approve a pending command: re-check the submitter's balance, debit,
    /// and execute (mocked).
    ///
    /// Unlike submission time, insufficient credits here is a fatal error —
    /// the approver must know the execution did not happen.
    pub fn approve_command(
        &self,
        command_id: CommandId,
        approver_id: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<CommandRecord, GatewayError> {
        let record = self.write(|inner| {
            inner.require_user(approver_id)?;
            approve_locked(inner, command_id, approver_id, reason, now)
        })?;
        info!(command_id = %command_id, approver_id = %approver_id, "command approved");
        Ok(record)
    }

    /// Reject a pending command with a mandatory reason. Never touches the
    /// ledger.
    pub fn reject_command(
        &self,
        command_id: CommandId,
        approver_id: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CommandRecord, GatewayError> {
        if reason.trim().is_empty() {
            return Err(GatewayError::EmptyReason);
        }
        let record = self.write(|inner| {
            inner.require_user(approver_id)?;
            let command = inner
                .commands
                .get_mut(&command_id)
                .ok_or(GatewayError::CommandNotFound(command_id))?;
            if command.status != CommandStatus::NeedsApproval {
                return Err(GatewayError::NotPendingApproval {
                    command_id,
                    status: command.status,
                });
            }
            command.status = CommandStatus::Rejected;
            command.approver_id = Some(approver_id);
            command.approved_at = Some(now);
            command.approval_reason = Some(reason.to_string());
            command.rejection_reason = Some(reason.to_string());
            let record = command.clone();

            inner.record(
                approver_id,
                Some(command_id),
                AuditEventType::CommandRejectedByApprover,
                serde_json::json!({
                    "reason": reason,
                }),
                now,
            );
            inner.record(
                record.user_id,
                Some(command_id),
                AuditEventType::CommandRejected,
                serde_json::json!({
                    "command_text": record.command_text,
                    "rejection_reason": reason,
                    "rejected_by": approver_id,
                }),
                now,
            );
            Ok(record)
        })?;
        info!(command_id = %command_id, approver_id = %approver_id, "command rejected");
        Ok(record)
    }

    /// The approval queue: pending commands with their current tallies,
    /// oldest first.
    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.read(|inner| {
            let mut pending: Vec<PendingApproval> = inner
                .commands
                .values()
                .filter(|c| c.status == CommandStatus::NeedsApproval)
                .map(|c| PendingApproval {
                    command: c.clone(),
                    votes: tally(inner, c.id),
                })
                .collect();
            pending.sort_by(|a, b| a.command.created_at.cmp(&b.command.created_at));
            pending
        })
    }

    /// Current tally for one command.
    pub fn vote_counts(&self, command_id: CommandId) -> VoteCounts {
        self.read(|inner| tally(inner, command_id))
    }
}

/// Tally the stored votes for a command.
fn tally(inner: &GatewayInner, command_id: CommandId) -> VoteCounts {
    let mut counts = VoteCounts::default();
    for vote in inner.votes.values().filter(|v| v.command_id == command_id) {
        match vote.vote_type {
            VoteType::Approve => counts.approve += 1,
            VoteType::Reject => counts.reject += 1,
        }
        counts.total += 1;
    }
    counts
}

/// Tally as it would look with `voter_id`'s vote set to `vote_type`.
fn prospective_counts(
    inner: &GatewayInner,
    command_id: CommandId,
    voter_id: UserId,
    vote_type: VoteType,
) -> VoteCounts {
    let mut counts = VoteCounts::default();
    for vote in inner
        .votes
        .values()
        .filter(|v| v.command_id == command_id && v.user_id != voter_id)
    {
        match vote.vote_type {
            VoteType::Approve => counts.approve += 1,
            VoteType::Reject => counts.reject += 1,
        }
        counts.total += 1;
    }
    match vote_type {
        VoteType::Approve => counts.approve += 1,
        VoteType::Reject => counts.reject += 1,
    }
    counts.total += 1;
    counts
}

/// The approval path shared by direct approval and threshold tipping.
/// Runs inside an already-held write lock.
pub(crate) fn approve_locked(
    inner: &mut GatewayInner,
    command_id: CommandId,
    approver_id: UserId,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<CommandRecord, GatewayError> {
    let command = inner
        .commands
        .get(&command_id)
        .ok_or(GatewayError::CommandNotFound(command_id))?;
    if command.status != CommandStatus::NeedsApproval {
        return Err(GatewayError::NotPendingApproval {
            command_id,
            status: command.status,
        });
    }
    let submitter = command.user_id;
    let cost = command.cost;
    let balance = inner.balance_of(submitter);
    if balance < cost {
        return Err(GatewayError::InsufficientCredits {
            required: cost,
            available: balance,
        });
    }

    inner.apply_credit(submitter, -cost, now);
    let command = inner
        .commands
        .get_mut(&command_id)
        .ok_or(GatewayError::CommandNotFound(command_id))?;
    command.status = CommandStatus::Executed;
    command.executed_at = Some(now);
    command.approver_id = Some(approver_id);
    command.approved_at = Some(now);
    command.approval_reason = reason.clone();
    command.output = Some(format!(
        "Execution mocked: would run '{}'",
        command.command_text
    ));
    let record = command.clone();

    inner.record(
        approver_id,
        Some(command_id),
        AuditEventType::CommandApproved,
        serde_json::json!({
            "reason": reason,
            "cost": cost,
        }),
        now,
    );
    inner.record(
        submitter,
        Some(command_id),
        AuditEventType::CommandExecuted,
        serde_json::json!({
            "command_text": record.command_text,
            "matched_rule_id": record.matched_rule_id,
            "cost": cost,
            "note": "mocked_execution",
            "approved_by": approver_id,
        }),
        now,
    );
    Ok(record)
}
