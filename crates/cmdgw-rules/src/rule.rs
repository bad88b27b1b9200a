//! # Rule Model
//!
//! Admission rules map command text to an outcome. Each rule carries a regex
//! pattern, a priority, an optional per-command cost, an activation schedule,
//! optional submitter restrictions, an optional escalation policy, and an
//! optional voting threshold for the approval flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cmdgw_core::{RuleId, UserId, ValidationError};

/// Cost debited when a rule does not specify one, and for the unmatched
/// default outcome.
pub const DEFAULT_COMMAND_COST: i64 = 1;

/// What happens to a command that matches a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    /// Execute immediately (mocked) and debit the cost.
    AutoAccept,
    /// Reject immediately; no debit.
    AutoReject,
    /// Park the command for human approval or voting.
    RequireApproval,
}

impl RuleAction {
    /// Stable string form used in audit details and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::AutoAccept => "AUTO_ACCEPT",
            RuleAction::AutoReject => "AUTO_REJECT",
            RuleAction::RequireApproval => "REQUIRE_APPROVAL",
        }
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action applied when an unhandled approval request times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationAction {
    /// Execute the command (mocked) when the escalation deadline passes.
    AutoAccept,
    /// Reject the command when the escalation deadline passes.
    AutoReject,
}

impl EscalationAction {
    /// Stable string form used in audit details and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationAction::AutoAccept => "AUTO_ACCEPT",
            EscalationAction::AutoReject => "AUTO_REJECT",
        }
    }
}

impl std::fmt::Display for EscalationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timeout behavior for commands a rule routes to approval.
///
/// Presence of a policy on a rule means escalation is enabled; rules without
/// one leave commands pending until a human acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// How long a command may sit in `needs_approval` before escalating.
    pub delay_ms: i64,
    /// What to do once the deadline passes.
    pub action: EscalationAction,
}

/// A recurring weekly activation window.
///
/// `day_of_week` uses 0 = Sunday through 6 = Saturday. Bounds are inclusive
/// on both ends. A window whose end precedes its start wraps past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Local day of week, 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u8,
    /// Window start hour, 0-23.
    pub start_hour: u8,
    /// Window start minute, 0-59.
    pub start_minute: u8,
    /// Window end hour, 0-23.
    pub end_hour: u8,
    /// Window end minute, 0-59.
    pub end_minute: u8,
    /// IANA timezone name; UTC when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// When a rule participates in matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// The rule is always active.
    Always,
    /// Active whenever any listed window matches the current time.
    TimeWindows {
        /// Candidate windows; any single match activates the rule.
        windows: Vec<TimeWindow>,
    },
    /// Active whenever the 5-field cron expression matches the current time.
    Cron {
        /// Standard 5-field expression: minute hour day month day-of-week.
        expr: String,
        /// IANA timezone name; UTC when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Always
    }
}

/// An admission rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule identifier.
    pub id: RuleId,
    /// Regex source the command text is matched against.
    pub pattern: String,
    /// Outcome applied when the pattern matches.
    pub action: RuleAction,
    /// Higher priority wins; ties break on earlier `created_at`.
    pub priority: i64,
    /// Credits debited on execution; `None` means [`DEFAULT_COMMAND_COST`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<i64>,
    /// Disabled rules never participate in matching.
    pub enabled: bool,
    /// When the rule participates in matching.
    #[serde(default)]
    pub schedule: Schedule,
    /// Restrict the rule to a single submitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_to_user: Option<UserId>,
    /// Restrict the rule to submitters holding this role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_to_role: Option<cmdgw_core::Role>,
    /// Timeout behavior for `REQUIRE_APPROVAL` outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationPolicy>,
    /// Approve-vote count that auto-approves a pending command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_threshold: Option<u32>,
    /// The admin who created the rule.
    pub created_by: UserId,
    /// Creation time; the matching tiebreaker.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Create an enabled, always-active rule with default priority and cost.
    pub fn new(pattern: impl Into<String>, action: RuleAction, created_by: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: RuleId::new(),
            pattern: pattern.into(),
            action,
            priority: 0,
            cost: None,
            enabled: true,
            schedule: Schedule::Always,
            restricted_to_user: None,
            restricted_to_role: None,
            escalation: None,
            voting_threshold: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the matching priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set an explicit per-command cost.
    pub fn with_cost(mut self, cost: i64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Set the activation schedule.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Attach an escalation policy.
    pub fn with_escalation(mut self, delay_ms: i64, action: EscalationAction) -> Self {
        self.escalation = Some(EscalationPolicy { delay_ms, action });
        self
    }

    /// Attach a voting threshold.
    pub fn with_voting_threshold(mut self, threshold: u32) -> Self {
        self.voting_threshold = Some(threshold);
        self
    }

    /// The cost this rule debits, applying the default.
    pub fn effective_cost(&self) -> i64 {
        self.cost.unwrap_or(DEFAULT_COMMAND_COST)
    }

    /// Whether a submitter satisfies this rule's restrictions.
    pub fn permits_submitter(&self, user_id: UserId, role: cmdgw_core::Role) -> bool {
        if let Some(only_user) = self.restricted_to_user {
            if only_user != user_id {
                return false;
            }
        }
        if let Some(only_role) = self.restricted_to_role {
            if only_role != role {
                return false;
            }
        }
        true
    }

    /// Validate the rule's pattern and schedule fields.
    ///
    /// Called on create and update so that stored rules always carry a
    /// compilable pattern and in-range window fields. The matcher still
    /// tolerates bad stored data (skip, fail closed) rather than trusting
    /// this invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pattern.is_empty() {
            return Err(ValidationError::EmptyField { field: "pattern" });
        }
        regex::Regex::new(&self.pattern).map_err(|e| ValidationError::InvalidPattern {
            pattern: self.pattern.clone(),
            reason: e.to_string(),
        })?;
        if let Schedule::TimeWindows { windows } = &self.schedule {
            for w in windows {
                check_range("day_of_week", w.day_of_week, 0, 6)?;
                check_range("start_hour", w.start_hour, 0, 23)?;
                check_range("start_minute", w.start_minute, 0, 59)?;
                check_range("end_hour", w.end_hour, 0, 23)?;
                check_range("end_minute", w.end_minute, 0, 59)?;
                if let Some(tz) = &w.timezone {
                    check_timezone(tz)?;
                }
            }
        }
        if let Schedule::Cron { timezone, .. } = &self.schedule {
            if let Some(tz) = timezone {
                check_timezone(tz)?;
            }
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: u8, min: i64, max: i64) -> Result<(), ValidationError> {
    let value = i64::from(value);
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_timezone(tz: &str) -> Result<(), ValidationError> {
    tz.parse::<chrono_tz::Tz>()
        .map(|_| ())
        .map_err(|_| ValidationError::UnknownTimezone {
            timezone: tz.to_string(),
        })
}
