#![deny(missing_docs)]

//! # cmdgw-rules — Admission Rules for the Command Gateway
//!
//! Everything the gateway needs to decide what happens to a submitted
//! command, independent of any storage or transport:
//!
//! - [`Rule`] — the rule model: regex pattern, action, priority, cost,
//!   activation schedule, restrictions, escalation policy, voting threshold.
//! - [`schedule`] — time-window and 5-field cron evaluation. Malformed
//!   schedule input never panics and never activates a rule (fail closed).
//! - [`matcher`] — priority-ordered first-match-wins command matching with
//!   prefix semantics for `^`-anchored patterns.
//! - [`conflict`] — advisory detection of duplicate, conflicting, and
//!   overlapping rules. Pure; never blocks a write.
//!
//! All evaluation takes the clock as an argument so callers (and tests)
//! control time.

pub mod conflict;
pub mod matcher;
pub mod rule;
pub mod schedule;

pub use conflict::{detect_conflicts, ConflictKind, RuleConflict};
pub use matcher::{
    active_rules, match_command, rule_precedence, MatchOutcome, DEFAULT_UNMATCHED_ACTION,
};
pub use rule::{
    EscalationAction, EscalationPolicy, Rule, RuleAction, Schedule, TimeWindow,
    DEFAULT_COMMAND_COST,
};
pub use schedule::{cron_matches, is_active, window_matches};
