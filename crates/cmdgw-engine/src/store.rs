//! # Gateway Store
//!
//! [`CommandGateway`] owns every table behind one `parking_lot` lock. Each
//! public operation acquires the lock once and runs its whole
//! read-validate-write sequence inside that critical section; nothing
//! `await`s while holding it. This is the transactional boundary the
//! admission pipeline, the approval flow, and the escalation sweep all rely
//! on.
//!
//! This module carries the store itself plus user, credit, and rule
//! administration. The lifecycle operations live in [`crate::admission`],
//! [`crate::approvals`], and [`crate::escalation`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use cmdgw_core::{CommandId, Role, RuleId, UserId};
use cmdgw_rules::{
    detect_conflicts, EscalationPolicy, Rule, RuleAction, RuleConflict, Schedule,
};

use crate::approvals::Vote;
use crate::audit::{AuditEntry, AuditEventType, AuditLog, AuditQuery};
use crate::command::{CommandRecord, CommandStatus};
use crate::error::GatewayError;
use crate::ledger::CreditEntry;
use crate::user::{User, UserWithBalance};

// ---------------------------------------------------------------------------
// GatewayInner
// ---------------------------------------------------------------------------

/// All gateway tables. Only ever touched inside the gateway lock.
#[derive(Debug, Default)]
pub(crate) struct GatewayInner {
    pub(crate) users: HashMap<UserId, User>,
    pub(crate) credits: HashMap<UserId, CreditEntry>,
    pub(crate) rules: HashMap<RuleId, Rule>,
    pub(crate) commands: HashMap<CommandId, CommandRecord>,
    pub(crate) votes: HashMap<(CommandId, UserId), Vote>,
    pub(crate) audit: AuditLog,
}

impl GatewayInner {
    /// Append an audit entry for a state change that just happened.
    pub(crate) fn record(
        &mut self,
        user_id: UserId,
        command_id: Option<CommandId>,
        event_type: AuditEventType,
        details: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        self.audit
            .append(AuditEntry::new(user_id, command_id, event_type, details, now));
    }

    pub(crate) fn require_user(&self, user_id: UserId) -> Result<&User, GatewayError> {
        self.users
            .get(&user_id)
            .ok_or(GatewayError::UserNotFound(user_id))
    }
}

// ---------------------------------------------------------------------------
// CommandGateway
// ---------------------------------------------------------------------------

/// The gateway store. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct CommandGateway {
    inner: Arc<RwLock<GatewayInner>>,
}

impl CommandGateway {
    /// An empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&GatewayInner) -> R) -> R {
        f(&self.inner.read())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut GatewayInner) -> R) -> R {
        f(&mut self.inner.write())
    }

    #[cfg(test)]
    pub(crate) fn with_inner_mut<R>(&self, f: impl FnOnce(&mut GatewayInner) -> R) -> R {
        self.write(f)
    }

    // -- users and credits --------------------------------------------------

    /// Register a user. Audited as `USER_CREATED`.
    pub fn create_user(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        now: DateTime<Utc>,
    ) -> User {
        let user = User {
            id: UserId::new(),
            name: name.into(),
            email: email.into(),
            role,
            created_at: now,
        };
        self.write(|inner| {
            inner.users.insert(user.id, user.clone());
            inner.record(
                user.id,
                None,
                AuditEventType::UserCreated,
                serde_json::json!({
                    "name": user.name,
                    "email": user.email,
                    "role": user.role.as_str(),
                }),
                now,
            );
        });
        info!(user_id = %user.id, role = user.role.as_str(), "user created");
        user
    }

    /// Fetch a user by id.
    pub fn get_user(&self, user_id: UserId) -> Result<User, GatewayError> {
        self.read(|inner| inner.require_user(user_id).cloned())
    }

    /// All users joined with their balances, for admin listings.
    pub fn list_users(&self) -> Vec<UserWithBalance> {
        self.read(|inner| {
            let mut users: Vec<UserWithBalance> = inner
                .users
                .values()
                .map(|u| UserWithBalance {
                    user: u.clone(),
                    balance: inner.balance_of(u.id),
                })
                .collect();
            users.sort_by(|a, b| a.user.created_at.cmp(&b.user.created_at));
            users
        })
    }

    /// Current balance; 0 when the user has no ledger entry.
    pub fn balance_of(&self, user_id: UserId) -> i64 {
        self.read(|inner| inner.balance_of(user_id))
    }

    /// Apply a signed adjustment to a user's balance. Audited as
    /// `CREDITS_ADJUSTED`. Returns the new balance.
    pub fn adjust_credits(
        &self,
        user_id: UserId,
        amount: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<i64, GatewayError> {
        self.write(|inner| {
            inner.require_user(user_id)?;
            let balance = inner.apply_credit(user_id, amount, now);
            inner.record(
                user_id,
                None,
                AuditEventType::CreditsAdjusted,
                serde_json::json!({
                    "amount": amount,
                    "reason": reason,
                    "new_balance": balance,
                }),
                now,
            );
            Ok(balance)
        })
    }

    // -- rules --------------------------------------------------------------

    /// Validate and store a rule. The gateway stamps both timestamps from
    /// `now`. Audited as `RULE_CREATED`.
    pub fn create_rule(&self, mut rule: Rule, now: DateTime<Utc>) -> Result<Rule, GatewayError> {
        rule.validate()?;
        rule.created_at = now;
        rule.updated_at = now;
        self.write(|inner| {
            inner.rules.insert(rule.id, rule.clone());
            inner.record(
                rule.created_by,
                None,
                AuditEventType::RuleCreated,
                serde_json::json!({
                    "rule_id": rule.id,
                    "pattern": rule.pattern,
                    "action": rule.action.as_str(),
                    "priority": rule.priority,
                }),
                now,
            );
        });
        info!(rule_id = %rule.id, pattern = %rule.pattern, "rule created");
        Ok(rule)
    }

    /// Apply a partial update to a rule. Provided fields replace the stored
    /// ones; absent fields are untouched (optional attributes cannot be
    /// cleared here, disable the rule instead). Audited as `RULE_UPDATED`.
    pub fn update_rule(
        &self,
        rule_id: RuleId,
        update: RuleUpdate,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<Rule, GatewayError> {
        self.write(|inner| {
            let Some(current) = inner.rules.get(&rule_id) else {
                return Err(GatewayError::RuleNotFound(rule_id));
            };
            let mut updated = current.clone();
            update.apply_to(&mut updated);
            updated.updated_at = now;
            updated.validate()?;

            let changed = update.changed_fields();
            inner.rules.insert(rule_id, updated.clone());
            inner.record(
                actor,
                None,
                AuditEventType::RuleUpdated,
                serde_json::json!({
                    "rule_id": rule_id,
                    "changed": changed,
                }),
                now,
            );
            Ok(updated)
        })
    }

    /// Delete a rule. Audited as `RULE_DELETED`.
    pub fn delete_rule(
        &self,
        rule_id: RuleId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        self.write(|inner| {
            let Some(rule) = inner.rules.remove(&rule_id) else {
                return Err(GatewayError::RuleNotFound(rule_id));
            };
            inner.record(
                actor,
                None,
                AuditEventType::RuleDeleted,
                serde_json::json!({
                    "rule_id": rule_id,
                    "pattern": rule.pattern,
                }),
                now,
            );
            Ok(())
        })
    }

    /// Fetch a rule by id.
    pub fn get_rule(&self, rule_id: RuleId) -> Result<Rule, GatewayError> {
        self.read(|inner| {
            inner
                .rules
                .get(&rule_id)
                .cloned()
                .ok_or(GatewayError::RuleNotFound(rule_id))
        })
    }

    /// All rules, highest priority first.
    pub fn list_rules(&self) -> Vec<Rule> {
        self.read(|inner| {
            let mut rules: Vec<Rule> = inner.rules.values().cloned().collect();
            rules.sort_by(|a, b| cmdgw_rules::rule_precedence(a, b));
            rules
        })
    }

    /// Probe the enabled rules for conflicts with a candidate pattern and
    /// action. Advisory only; rule writes never consult this.
    pub fn detect_rule_conflicts(
        &self,
        pattern: &str,
        action: RuleAction,
        exclude: Option<RuleId>,
    ) -> Vec<RuleConflict> {
        self.read(|inner| detect_conflicts(pattern, action, exclude, inner.rules.values()))
    }

    // -- command queries ----------------------------------------------------

    /// Fetch a command by id.
    pub fn get_command(&self, command_id: CommandId) -> Result<CommandRecord, GatewayError> {
        self.read(|inner| {
            inner
                .commands
                .get(&command_id)
                .cloned()
                .ok_or(GatewayError::CommandNotFound(command_id))
        })
    }

    /// Commands newest first, optionally filtered by submitter and status.
    pub fn list_commands(
        &self,
        user_id: Option<UserId>,
        status: Option<CommandStatus>,
    ) -> Vec<CommandRecord> {
        self.read(|inner| {
            let mut commands: Vec<CommandRecord> = inner
                .commands
                .values()
                .filter(|c| user_id.map_or(true, |u| c.user_id == u))
                .filter(|c| status.map_or(true, |s| c.status == s))
                .cloned()
                .collect();
            commands.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            commands
        })
    }

    // -- audit --------------------------------------------------------------

    /// Query the audit log, newest first.
    pub fn audit_entries(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.read(|inner| inner.audit.query(query))
    }

    /// Total number of audit entries ever recorded.
    pub fn audit_len(&self) -> usize {
        self.read(|inner| inner.audit.len())
    }
}

// ---------------------------------------------------------------------------
// RuleUpdate
// ---------------------------------------------------------------------------

/// A partial rule update. Every field is optional; provided fields replace
/// the stored values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuleUpdate {
    /// Replace the regex pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Replace the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RuleAction>,
    /// Replace the priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Replace the per-command cost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<i64>,
    /// Enable or disable the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Replace the activation schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Replace the submitter restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_to_user: Option<UserId>,
    /// Replace the role restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_to_role: Option<Role>,
    /// Replace the escalation policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationPolicy>,
    /// Replace the voting threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_threshold: Option<u32>,
}

impl RuleUpdate {
    fn apply_to(&self, rule: &mut Rule) {
        if let Some(pattern) = &self.pattern {
            rule.pattern = pattern.clone();
        }
        if let Some(action) = self.action {
            rule.action = action;
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(cost) = self.cost {
            rule.cost = Some(cost);
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(schedule) = &self.schedule {
            rule.schedule = schedule.clone();
        }
        if let Some(user) = self.restricted_to_user {
            rule.restricted_to_user = Some(user);
        }
        if let Some(role) = self.restricted_to_role {
            rule.restricted_to_role = Some(role);
        }
        if let Some(escalation) = self.escalation {
            rule.escalation = Some(escalation);
        }
        if let Some(threshold) = self.voting_threshold {
            rule.voting_threshold = Some(threshold);
        }
    }

    fn changed_fields(&self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.pattern.is_some() {
            changed.push("pattern");
        }
        if self.action.is_some() {
            changed.push("action");
        }
        if self.priority.is_some() {
            changed.push("priority");
        }
        if self.cost.is_some() {
            changed.push("cost");
        }
        if self.enabled.is_some() {
            changed.push("enabled");
        }
        if self.schedule.is_some() {
            changed.push("schedule");
        }
        if self.restricted_to_user.is_some() {
            changed.push("restricted_to_user");
        }
        if self.restricted_to_role.is_some() {
            changed.push("restricted_to_role");
        }
        if self.escalation.is_some() {
            changed.push("escalation");
        }
        if self.voting_threshold.is_some() {
            changed.push("voting_threshold");
        }
        changed
    }
}
