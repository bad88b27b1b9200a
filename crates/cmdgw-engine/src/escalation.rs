//! # Escalation Sweep
//!
//! Commands parked for approval can carry an escalation deadline copied
//! from their rule. [`CommandGateway::process_escalations`] resolves every
//! overdue command according to its rule's escalation action.
//!
//! The sweep is idempotent: processed commands are marked `escalated` and
//! never picked up again. One command failing to resolve does not abort the
//! sweep.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use cmdgw_core::CommandId;
use cmdgw_rules::EscalationAction;

use crate::audit::AuditEventType;
use crate::command::CommandStatus;
use crate::error::GatewayError;
use crate::store::{CommandGateway, GatewayInner};

/// Rejection reason recorded for escalated auto-rejections.
pub const REASON_ESCALATION_TIMEOUT: &str = "Escalated: Auto-rejected due to timeout";

impl CommandGateway {
    /// Resolve every command whose escalation deadline has passed.
    ///
    /// Selects `needs_approval` commands with `escalation_at <= now` that
    /// have not been escalated yet. Commands whose rule has disappeared or
    /// no longer carries an escalation policy are skipped (and retried next
    /// sweep). Returns the number of commands resolved.
    pub fn process_escalations(&self, now: DateTime<Utc>) -> usize {
        let processed = self.write(|inner| {
            let due: Vec<CommandId> = inner
                .commands
                .values()
                .filter(|c| c.status == CommandStatus::NeedsApproval)
                .filter(|c| !c.escalated)
                .filter(|c| c.escalation_at.map_or(false, |at| at <= now))
                .map(|c| c.id)
                .collect();

            let mut processed = 0;
            for command_id in due {
                match escalate_one(inner, command_id, now) {
                    Ok(true) => processed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(command_id = %command_id, error = %e, "escalation failed, continuing sweep");
                    }
                }
            }
            processed
        });
        if processed > 0 {
            info!(processed, "escalation sweep resolved commands");
        }
        processed
    }
}

/// Resolve one overdue command. Returns `Ok(false)` when the command was
/// skipped because no escalation policy could be resolved.
fn escalate_one(
    inner: &mut GatewayInner,
    command_id: CommandId,
    now: DateTime<Utc>,
) -> Result<bool, GatewayError> {
    let command = inner
        .commands
        .get(&command_id)
        .ok_or(GatewayError::CommandNotFound(command_id))?;
    let submitter = command.user_id;
    let cost = command.cost;
    let escalation_at = command.escalation_at;

    let action = command
        .matched_rule_id
        .and_then(|rule_id| inner.rules.get(&rule_id))
        .and_then(|rule| rule.escalation)
        .map(|policy| policy.action);
    let Some(action) = action else {
        warn!(command_id = %command_id, "overdue command has no resolvable escalation policy, skipping");
        return Ok(false);
    };

    let (new_status, output, rejection_reason) = match action {
        EscalationAction::AutoAccept => {
            // Escalated executions may overdraw; the deadline was the
            // submitter's grace period.
            inner.apply_credit(submitter, -cost, now);
            let command = inner
                .commands
                .get_mut(&command_id)
                .ok_or(GatewayError::CommandNotFound(command_id))?;
            command.status = CommandStatus::Executed;
            command.executed_at = Some(now);
            let text = format!(
                "Execution mocked (escalated): would run '{}'",
                command.command_text
            );
            command.output = Some(text.clone());
            (CommandStatus::Executed, Some(text), None)
        }
        EscalationAction::AutoReject => {
            let command = inner
                .commands
                .get_mut(&command_id)
                .ok_or(GatewayError::CommandNotFound(command_id))?;
            command.status = CommandStatus::Rejected;
            command.rejection_reason = Some(REASON_ESCALATION_TIMEOUT.to_string());
            (
                CommandStatus::Rejected,
                None,
                Some(REASON_ESCALATION_TIMEOUT.to_string()),
            )
        }
    };

    let command = inner
        .commands
        .get_mut(&command_id)
        .ok_or(GatewayError::CommandNotFound(command_id))?;
    command.escalated = true;
    command.escalation_action = Some(action);
    let command_text = command.command_text.clone();
    let matched_rule_id = command.matched_rule_id;

    inner.record(
        submitter,
        Some(command_id),
        AuditEventType::CommandEscalated,
        serde_json::json!({
            "escalation_action": action.as_str(),
            "original_status": CommandStatus::NeedsApproval.as_str(),
            "new_status": new_status.as_str(),
            "escalation_at": escalation_at,
            "processed_at": now,
        }),
        now,
    );
    match new_status {
        CommandStatus::Executed => inner.record(
            submitter,
            Some(command_id),
            AuditEventType::CommandExecuted,
            serde_json::json!({
                "command_text": command_text,
                "matched_rule_id": matched_rule_id,
                "cost": cost,
                "output": output,
                "note": "escalated_execution",
            }),
            now,
        ),
        CommandStatus::Rejected => inner.record(
            submitter,
            Some(command_id),
            AuditEventType::CommandRejected,
            serde_json::json!({
                "command_text": command_text,
                "matched_rule_id": matched_rule_id,
                "rejection_reason": rejection_reason,
                "note": "escalated_execution",
            }),
            now,
        ),
        CommandStatus::Pending | CommandStatus::NeedsApproval => {}
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditQuery;
    use chrono::{Duration, TimeZone};
    use cmdgw_core::{Role, RuleId, UserId};
    use cmdgw_rules::{Rule, RuleAction};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn setup(action: EscalationAction) -> (CommandGateway, UserId, CommandId, RuleId) {
        let gw = CommandGateway::new();
        let admin = gw.create_user("root", "root@example.com", Role::Admin, now()).id;
        let member = gw.create_user("ana", "ana@example.com", Role::Member, now()).id;
        gw.adjust_credits(member, 10, None, now()).unwrap();
        let rule = gw
            .create_rule(
                Rule::new("^deploy", RuleAction::RequireApproval, admin)
                    .with_cost(4)
                    .with_escalation(60_000, action),
                now(),
            )
            .unwrap();
        let command_id = gw
            .submit_command(member, "deploy prod", now())
            .unwrap()
            .command_id;
        (gw, member, command_id, rule.id)
    }

    fn after_deadline() -> DateTime<Utc> {
        now() + Duration::milliseconds(60_001)
    }

    #[test]
    fn not_due_commands_are_untouched() {
        let (gw, _, command_id, _) = setup(EscalationAction::AutoReject);
        assert_eq!(gw.process_escalations(now() + Duration::seconds(30)), 0);
        assert_eq!(
            gw.get_command(command_id).unwrap().status,
            CommandStatus::NeedsApproval
        );
    }

    #[test]
    fn due_auto_accept_executes_and_debits() {
        let (gw, member, command_id, _) = setup(EscalationAction::AutoAccept);
        assert_eq!(gw.process_escalations(after_deadline()), 1);
        let record = gw.get_command(command_id).unwrap();
        assert_eq!(record.status, CommandStatus::Executed);
        assert!(record.escalated);
        assert_eq!(record.escalation_action, Some(EscalationAction::AutoAccept));
        assert_eq!(
            record.output.as_deref(),
            Some("Execution mocked (escalated): would run 'deploy prod'")
        );
        assert_eq!(gw.balance_of(member), 6);
    }

    #[test]
    fn due_auto_reject_keeps_ledger() {
        let (gw, member, command_id, _) = setup(EscalationAction::AutoReject);
        assert_eq!(gw.process_escalations(after_deadline()), 1);
        let record = gw.get_command(command_id).unwrap();
        assert_eq!(record.status, CommandStatus::Rejected);
        assert_eq!(
            record.rejection_reason.as_deref(),
            Some(REASON_ESCALATION_TIMEOUT)
        );
        assert_eq!(gw.balance_of(member), 10);
    }

    #[test]
    fn sweep_is_idempotent() {
        let (gw, _, _, _) = setup(EscalationAction::AutoReject);
        assert_eq!(gw.process_escalations(after_deadline()), 1);
        assert_eq!(gw.process_escalations(after_deadline()), 0);
    }

    #[test]
    fn escalated_accept_may_overdraw() {
        let (gw, member, command_id, _) = setup(EscalationAction::AutoAccept);
        gw.adjust_credits(member, -9, None, now()).unwrap();
        assert_eq!(gw.process_escalations(after_deadline()), 1);
        assert_eq!(
            gw.get_command(command_id).unwrap().status,
            CommandStatus::Executed
        );
        assert_eq!(gw.balance_of(member), -3);
    }

    #[test]
    fn missing_rule_skips_but_keeps_sweeping() {
        let (gw, _, skipped_id, rule_id) = setup(EscalationAction::AutoReject);
        // Remove the rule out from under the parked command.
        let admin = gw.create_user("ops", "ops@example.com", Role::Admin, now()).id;
        gw.delete_rule(rule_id, admin, now()).unwrap();
        assert_eq!(gw.process_escalations(after_deadline()), 0);
        let record = gw.get_command(skipped_id).unwrap();
        assert_eq!(record.status, CommandStatus::NeedsApproval);
        assert!(!record.escalated);
    }

    #[test]
    fn escalation_audit_trail_is_complete() {
        let (gw, _, command_id, _) = setup(EscalationAction::AutoReject);
        gw.process_escalations(after_deadline());
        let entries = gw.audit_entries(&AuditQuery {
            command_id: Some(command_id),
            event_type: Some(AuditEventType::CommandEscalated),
            ..Default::default()
        });
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details["escalation_action"], "AUTO_REJECT");
        assert_eq!(entries[0].details["new_status"], "rejected");
    }
}
