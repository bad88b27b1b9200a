//! # Command Matching
//!
//! Resolves which rule, if any, governs a piece of command text. Matching is
//! first-match-wins over the precedence order: priority descending, then
//! creation time ascending. The comparator is a named function so the
//! ordering can be tested in isolation.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tracing::warn;

use cmdgw_core::{Role, UserId};

use crate::rule::{Rule, RuleAction, DEFAULT_COMMAND_COST};
use crate::schedule;

/// Outcome applied when no enabled, active rule matches the command text.
///
/// This is a deliberate closed-by-default posture: unrecognized commands are
/// rejected rather than executed. Changing this constant changes the
/// gateway's default admission policy.
pub const DEFAULT_UNMATCHED_ACTION: RuleAction = RuleAction::AutoReject;

/// Precedence comparator: higher `priority` first, earlier `created_at`
/// breaks ties. Used with a stable sort, so full ties keep insertion order.
pub fn rule_precedence(a: &Rule, b: &Rule) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Filter to the rules eligible for a submitter at `now`, in precedence
/// order: enabled, schedule-active, and restriction-satisfied.
pub fn active_rules<'a, I>(
    rules: I,
    user_id: UserId,
    role: Role,
    now: DateTime<Utc>,
) -> Vec<&'a Rule>
where
    I: IntoIterator<Item = &'a Rule>,
{
    let mut eligible: Vec<&Rule> = rules
        .into_iter()
        .filter(|r| r.enabled)
        .filter(|r| r.permits_submitter(user_id, role))
        .filter(|r| schedule::is_active(r, now))
        .collect();
    eligible.sort_by(|a, b| rule_precedence(a, b));
    eligible
}

/// The result of matching command text against the eligible rules.
#[derive(Debug, Clone, Copy)]
pub struct MatchOutcome<'a> {
    /// The winning rule, or `None` for the unmatched default.
    pub rule: Option<&'a Rule>,
    /// The action to apply.
    pub action: RuleAction,
    /// Credits this outcome would debit on execution.
    pub cost: i64,
}

/// Match `text` against `rules` (already in precedence order); first match
/// wins.
///
/// A pattern beginning with `^` carries prefix semantics: it only matches
/// when the regex match starts at offset zero. Any other pattern matches
/// anywhere in the text. A stored pattern that fails to compile is skipped
/// and matching continues with the next rule.
pub fn match_command<'a>(text: &str, rules: &[&'a Rule]) -> MatchOutcome<'a> {
    for rule in rules {
        let re = match regex::Regex::new(&rule.pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(rule_id = %rule.id, pattern = %rule.pattern, error = %e,
                      "skipping rule with uncompilable pattern");
                continue;
            }
        };
        let hit = if rule.pattern.starts_with('^') {
            re.find(text).map_or(false, |m| m.start() == 0)
        } else {
            re.is_match(text)
        };
        if hit {
            return MatchOutcome {
                rule: Some(rule),
                action: rule.action,
                cost: rule.effective_cost(),
            };
        }
    }
    MatchOutcome {
        rule: None,
        action: DEFAULT_UNMATCHED_ACTION,
        cost: DEFAULT_COMMAND_COST,
    }
}
