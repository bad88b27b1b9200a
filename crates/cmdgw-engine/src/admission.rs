//! # Admission Pipeline
//!
//! [`CommandGateway::submit_command`] decides, in one critical section, what
//! happens to a piece of submitted command text: execute it (mocked), reject
//! it, or park it for approval. The balance check and any debit commit
//! together with the command insert.
//!
//! Insufficient credits at submission time is a domain outcome — a rejected
//! command — never an error. Only an unknown submitter is fatal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use cmdgw_core::{CommandId, RuleId, UserId};
use cmdgw_rules::{active_rules, match_command, RuleAction};

use crate::audit::AuditEventType;
use crate::command::{CommandRecord, CommandStatus};
use crate::error::GatewayError;
use crate::store::{CommandGateway, GatewayInner};

/// Rejection reason recorded when the submitter cannot cover the cost.
pub const REASON_INSUFFICIENT_CREDITS: &str = "INSUFFICIENT_CREDITS";

/// Rejection reason for commands matched by an `AUTO_REJECT` rule.
pub const REASON_MATCHED_AUTO_REJECT: &str = "Matched rule with AUTO_REJECT action";

/// Rejection reason for commands no rule matched.
pub const REASON_UNMATCHED: &str = "No matching rule found - default AUTO_REJECT";

/// What the admission pipeline decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// The stored command's identifier.
    pub command_id: CommandId,
    /// The status the command landed in.
    pub status: CommandStatus,
    /// The action that was applied (the default action when no rule
    /// matched).
    pub action: RuleAction,
    /// Credits the command costs.
    pub cost: i64,
    /// The deciding rule, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<RuleId>,
    /// Mocked execution output, for executed commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Why the command was rejected, for rejected commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl CommandGateway {
    /// Run the admission pipeline for one command.
    ///
    /// Pipeline order: submitter lookup, zero-balance short-circuit, rule
    /// snapshot and match, cost-aware balance check, then the action's
    /// outcome. The whole sequence runs under one write lock.
    pub fn submit_command(
        &self,
        user_id: UserId,
        command_text: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmissionOutcome, GatewayError> {
        let outcome = self.write(|inner| -> Result<SubmissionOutcome, GatewayError> {
            let role = inner.require_user(user_id)?.role;
            let balance = inner.balance_of(user_id);

            // Short-circuit before matching when there is nothing to spend.
            if balance <= 0 {
                return Ok(reject_insufficient(
                    inner,
                    user_id,
                    command_text,
                    None,
                    cmdgw_rules::DEFAULT_COMMAND_COST,
                    balance,
                    now,
                ));
            }

            let (action, cost, rule) = {
                let eligible = active_rules(inner.rules.values(), user_id, role, now);
                let matched = match_command(command_text, &eligible);
                (matched.action, matched.cost, matched.rule.cloned())
            };
            let matched_rule_id = rule.as_ref().map(|r| r.id);

            if balance < cost {
                return Ok(reject_insufficient(
                    inner,
                    user_id,
                    command_text,
                    matched_rule_id,
                    cost,
                    balance,
                    now,
                ));
            }

            let mut record = CommandRecord::new(user_id, command_text, now);
            record.matched_rule_id = matched_rule_id;
            record.cost = cost;

            let mut output = None;
            let mut rejection_reason = None;
            match action {
                RuleAction::AutoAccept => {
                    inner.apply_credit(user_id, -cost, now);
                    record.status = CommandStatus::Executed;
                    record.executed_at = Some(now);
                    let text = format!("Execution mocked: would run '{command_text}'");
                    record.output = Some(text.clone());
                    output = Some(text);
                }
                RuleAction::AutoReject => {
                    record.status = CommandStatus::Rejected;
                    let reason = if rule.is_some() {
                        REASON_MATCHED_AUTO_REJECT
                    } else {
                        REASON_UNMATCHED
                    };
                    record.rejection_reason = Some(reason.to_string());
                    rejection_reason = Some(reason.to_string());
                }
                RuleAction::RequireApproval => {
                    record.status = CommandStatus::NeedsApproval;
                    if let Some(r) = &rule {
                        if let Some(escalation) = r.escalation {
                            record.escalation_at =
                                Some(now + Duration::milliseconds(escalation.delay_ms));
                        }
                        record.voting_threshold = r.voting_threshold;
                    }
                }
            }

            let command_id = record.id;
            let status = record.status;
            inner.commands.insert(command_id, record);

            inner.record(
                user_id,
                Some(command_id),
                AuditEventType::CommandSubmitted,
                serde_json::json!({
                    "command_text": command_text,
                    "matched_rule_id": matched_rule_id,
                    "action": action.as_str(),
                    "cost": cost,
                }),
                now,
            );
            match status {
                CommandStatus::Executed => inner.record(
                    user_id,
                    Some(command_id),
                    AuditEventType::CommandExecuted,
                    serde_json::json!({
                        "command_text": command_text,
                        "matched_rule_id": matched_rule_id,
                        "cost": cost,
                        "note": "mocked_execution",
                    }),
                    now,
                ),
                CommandStatus::Rejected => inner.record(
                    user_id,
                    Some(command_id),
                    AuditEventType::CommandRejected,
                    serde_json::json!({
                        "command_text": command_text,
                        "matched_rule_id": matched_rule_id,
                        "rejection_reason": rejection_reason,
                    }),
                    now,
                ),
                CommandStatus::Pending | CommandStatus::NeedsApproval => {}
            }

            Ok(SubmissionOutcome {
                command_id,
                status,
                action,
                cost,
                matched_rule_id,
                output,
                rejection_reason,
            })
        })?;

        info!(
            command_id = %outcome.command_id,
            status = outcome.status.as_str(),
            action = outcome.action.as_str(),
            cost = outcome.cost,
            "command admitted"
        );
        Ok(outcome)
    }
}

/// Store a rejected command for a submitter who cannot cover `cost`, with
/// both audit entries. Never touches the ledger.
fn reject_insufficient(
    inner: &mut GatewayInner,
    user_id: UserId,
    command_text: &str,
    matched_rule_id: Option<RuleId>,
    cost: i64,
    balance: i64,
    now: DateTime<Utc>,
) -> SubmissionOutcome {
    let mut record = CommandRecord::new(user_id, command_text, now);
    record.status = CommandStatus::Rejected;
    record.matched_rule_id = matched_rule_id;
    record.cost = cost;
    record.rejection_reason = Some(REASON_INSUFFICIENT_CREDITS.to_string());
    let command_id = record.id;
    inner.commands.insert(command_id, record);

    inner.record(
        user_id,
        Some(command_id),
        AuditEventType::CommandSubmitted,
        serde_json::json!({
            "command_text": command_text,
            "matched_rule_id": matched_rule_id,
        }),
        now,
    );
    inner.record(
        user_id,
        Some(command_id),
        AuditEventType::CommandRejected,
        serde_json::json!({
            "reason": REASON_INSUFFICIENT_CREDITS,
            "required": cost,
            "available": balance,
        }),
        now,
    );

    SubmissionOutcome {
        command_id,
        status: CommandStatus::Rejected,
        action: RuleAction::AutoReject,
        cost,
        matched_rule_id,
        output: None,
        rejection_reason: Some(REASON_INSUFFICIENT_CREDITS.to_string()),
    }
}
