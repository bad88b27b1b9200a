//! # Advisory Conflict Detection
//!
//! Heuristic detection of rules that would fight each other. The check is a
//! pure function over the currently enabled rules: it never blocks a write
//! and never errors. Admins see the result as a warning when authoring a
//! rule.
//!
//! Because deciding true regex-language overlap is expensive, the heuristic
//! probes each existing rule with strings derived from the candidate
//! pattern: the metacharacter-stripped literal, the raw pattern, and the
//! raw pattern with prefix/suffix padding. A reverse probe tests the
//! existing rule's stripped literal against the candidate regex.

use regex::Regex;
use serde::{Deserialize, Serialize};

use cmdgw_core::RuleId;

use crate::rule::{Rule, RuleAction};

/// How two rules conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Another enabled rule has the identical pattern string.
    ExactDuplicate,
    /// The patterns plausibly match the same commands with incompatible
    /// actions.
    ConflictingAction,
    /// The patterns plausibly match the same commands with the same or a
    /// compatible action.
    OverlappingPattern,
}

impl ConflictKind {
    /// Stable string form used in API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::ExactDuplicate => "exact_duplicate",
            ConflictKind::ConflictingAction => "conflicting_action",
            ConflictKind::OverlappingPattern => "overlapping_pattern",
        }
    }
}

/// A detected conflict with one existing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConflict {
    /// Classification of the conflict.
    pub kind: ConflictKind,
    /// The existing rule involved.
    pub rule_id: RuleId,
    /// That rule's pattern.
    pub pattern: String,
    /// That rule's action.
    pub action: RuleAction,
}

/// Probe the enabled rules for conflicts with a candidate pattern/action.
///
/// `exclude` skips the rule being edited so updates do not conflict with
/// themselves. Existing rules whose stored pattern no longer compiles are
/// skipped silently.
pub fn detect_conflicts<'a, I>(
    pattern: &str,
    action: RuleAction,
    exclude: Option<RuleId>,
    existing: I,
) -> Vec<RuleConflict>
where
    I: IntoIterator<Item = &'a Rule>,
{
    let candidate_re = Regex::new(pattern).ok();
    let probes = candidate_probes(pattern);

    let mut conflicts = Vec::new();
    for rule in existing {
        if !rule.enabled {
            continue;
        }
        if exclude == Some(rule.id) {
            continue;
        }
        if rule.pattern == pattern {
            conflicts.push(conflict(ConflictKind::ExactDuplicate, rule));
            continue;
        }
        let Ok(existing_re) = Regex::new(&rule.pattern) else {
            continue;
        };
        let forward = probes.iter().any(|p| existing_re.is_match(p));
        let reverse = candidate_re
            .as_ref()
            .map_or(false, |re| re.is_match(&strip_metacharacters(&rule.pattern)));
        if forward || reverse {
            let kind = if action != rule.action {
                ConflictKind::ConflictingAction
            } else {
                ConflictKind::OverlappingPattern
            };
            conflicts.push(conflict(kind, rule));
        }
    }
    conflicts
}

fn conflict(kind: ConflictKind, rule: &Rule) -> RuleConflict {
    RuleConflict {
        kind,
        rule_id: rule.id,
        pattern: rule.pattern.clone(),
        action: rule.action,
    }
}

fn candidate_probes(pattern: &str) -> Vec<String> {
    let literal = strip_metacharacters(pattern);
    let mut probes = vec![literal, pattern.to_string()];
    probes.push(format!("x{pattern}"));
    probes.push(format!("{pattern}x"));
    probes
}

/// Remove regex metacharacters, leaving the literal core of a pattern.
fn strip_metacharacters(pattern: &str) -> String {
    pattern
        .chars()
        .filter(|c| !matches!(c, '^' | '$' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'))
        .collect()
}
