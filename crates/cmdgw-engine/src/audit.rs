//! # Audit Log
//!
//! Append-only record of every state change in the gateway. Each entry
//! carries a SHA-256 content digest computed at append time, so an entry
//! mutated after the fact no longer verifies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use cmdgw_core::{AuditEntryId, CommandId, UserId};

// ---------------------------------------------------------------------------
// AuditEventType
// ---------------------------------------------------------------------------

/// The kind of state change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// A command entered the admission pipeline.
    CommandSubmitted,
    /// A command was executed (mocked).
    CommandExecuted,
    /// A command was rejected.
    CommandRejected,
    /// An approver accepted a pending command.
    CommandApproved,
    /// An approver rejected a pending command.
    CommandRejectedByApprover,
    /// The escalation sweep resolved a timed-out command.
    CommandEscalated,
    /// A vote was cast or replaced on a pending command.
    VoteCast,
    /// An admission rule was created.
    RuleCreated,
    /// An admission rule was updated.
    RuleUpdated,
    /// An admission rule was deleted.
    RuleDeleted,
    /// A user was registered.
    UserCreated,
    /// An admin adjusted a user's credit balance.
    CreditsAdjusted,
}

impl AuditEventType {
    /// Stable string form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandSubmitted => "COMMAND_SUBMITTED",
            Self::CommandExecuted => "COMMAND_EXECUTED",
            Self::CommandRejected => "COMMAND_REJECTED",
            Self::CommandApproved => "COMMAND_APPROVED",
            Self::CommandRejectedByApprover => "COMMAND_REJECTED_BY_APPROVER",
            Self::CommandEscalated => "COMMAND_ESCALATED",
            Self::VoteCast => "VOTE_CAST",
            Self::RuleCreated => "RULE_CREATED",
            Self::RuleUpdated => "RULE_UPDATED",
            Self::RuleDeleted => "RULE_DELETED",
            Self::UserCreated => "USER_CREATED",
            Self::CreditsAdjusted => "CREDITS_ADJUSTED",
        }
    }

    /// Parse the stable string form. Returns `None` for unknown input.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMMAND_SUBMITTED" => Some(Self::CommandSubmitted),
            "COMMAND_EXECUTED" => Some(Self::CommandExecuted),
            "COMMAND_REJECTED" => Some(Self::CommandRejected),
            "COMMAND_APPROVED" => Some(Self::CommandApproved),
            "COMMAND_REJECTED_BY_APPROVER" => Some(Self::CommandRejectedByApprover),
            "COMMAND_ESCALATED" => Some(Self::CommandEscalated),
            "VOTE_CAST" => Some(Self::VoteCast),
            "RULE_CREATED" => Some(Self::RuleCreated),
            "RULE_UPDATED" => Some(Self::RuleUpdated),
            "RULE_DELETED" => Some(Self::RuleDeleted),
            "USER_CREATED" => Some(Self::UserCreated),
            "CREDITS_ADJUSTED" => Some(Self::CreditsAdjusted),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub id: AuditEntryId,
    /// The user this entry concerns (submitter, approver, voter, or admin).
    pub user_id: UserId,
    /// The command this entry concerns, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
    /// What happened.
    pub event_type: AuditEventType,
    /// Event-specific payload.
    pub details: serde_json::Value,
    /// When the entry was appended.
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 over the entry content, computed at append time.
    pub digest: String,
}

impl AuditEntry {
    /// Build an entry and compute its content digest.
    pub fn new(
        user_id: UserId,
        command_id: Option<CommandId>,
        event_type: AuditEventType,
        details: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        let id = AuditEntryId::new();
        let digest = content_digest(&id, user_id, command_id, event_type, &details, created_at);
        Self {
            id,
            user_id,
            command_id,
            event_type,
            details,
            created_at,
            digest,
        }
    }

    /// Recompute the digest and compare against the stored one.
    pub fn verify_digest(&self) -> bool {
        let expected = content_digest(
            &self.id,
            self.user_id,
            self.command_id,
            self.event_type,
            &self.details,
            self.created_at,
        );
        self.digest == expected
    }
}

fn content_digest(
    id: &AuditEntryId,
    user_id: UserId,
    command_id: Option<CommandId>,
    event_type: AuditEventType,
    details: &serde_json::Value,
    created_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(user_id.to_string().as_bytes());
    hasher.update(b"|");
    if let Some(cmd) = command_id {
        hasher.update(cmd.to_string().as_bytes());
    }
    hasher.update(b"|");
    hasher.update(event_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(details.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(created_at.to_rfc3339().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ---------------------------------------------------------------------------
// AuditQuery / AuditLog
// ---------------------------------------------------------------------------

/// Hard cap on entries returned by a single query.
pub const MAX_QUERY_LIMIT: usize = 100;

/// Filters for reading the audit log. All fields are optional and conjoin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Only entries concerning this user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Only entries concerning this command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
    /// Only entries of this event type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<AuditEventType>,
    /// Only entries at or after this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    /// Only entries at or before this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    /// Maximum entries to return, capped at [`MAX_QUERY_LIMIT`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// The append-only audit log.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry. Entries are never modified or removed.
    pub fn append(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    /// Total number of entries ever appended.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Query entries newest first, applying every filter in `query`.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let limit = query.limit.unwrap_or(MAX_QUERY_LIMIT).min(MAX_QUERY_LIMIT);
        self.entries
            .iter()
            .rev()
            .filter(|e| query.user_id.map_or(true, |u| e.user_id == u))
            .filter(|e| query.command_id.map_or(true, |c| e.command_id == Some(c)))
            .filter(|e| query.event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| query.from.map_or(true, |from| e.created_at >= from))
            .filter(|e| query.to.map_or(true, |to| e.created_at <= to))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(event_type: AuditEventType, user_id: UserId, minute: u32) -> AuditEntry {
        AuditEntry::new(
            user_id,
            None,
            event_type,
            serde_json::json!({"n": minute}),
            Utc.with_ymd_and_hms(2024, 1, 15, 12, minute, 0).unwrap(),
        )
    }

    #[test]
    fn digest_verifies_until_tampered() {
        let mut e = entry(AuditEventType::CommandSubmitted, UserId::new(), 0);
        assert!(e.verify_digest());
        e.details = serde_json::json!({"n": 999});
        assert!(!e.verify_digest());
    }

    #[test]
    fn query_is_newest_first() {
        let user = UserId::new();
        let mut log = AuditLog::new();
        for minute in 0..3 {
            log.append(entry(AuditEventType::CommandSubmitted, user, minute));
        }
        let got = log.query(&AuditQuery::default());
        assert_eq!(got.len(), 3);
        assert!(got[0].created_at > got[2].created_at);
    }

    #[test]
    fn query_filters_conjoin() {
        let alice = UserId::new();
        let bob = UserId::new();
        let mut log = AuditLog::new();
        log.append(entry(AuditEventType::CommandSubmitted, alice, 0));
        log.append(entry(AuditEventType::CommandExecuted, alice, 1));
        log.append(entry(AuditEventType::CommandSubmitted, bob, 2));

        let got = log.query(&AuditQuery {
            user_id: Some(alice),
            event_type: Some(AuditEventType::CommandSubmitted),
            ..Default::default()
        });
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].user_id, alice);
    }

    #[test]
    fn query_time_range_is_inclusive() {
        let user = UserId::new();
        let mut log = AuditLog::new();
        for minute in 0..5 {
            log.append(entry(AuditEventType::VoteCast, user, minute));
        }
        let from = Utc.with_ymd_and_hms(2024, 1, 15, 12, 1, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 15, 12, 3, 0).unwrap();
        let got = log.query(&AuditQuery {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        });
        assert_eq!(got.len(), 3);
    }

    #[test]
    fn query_limit_is_capped() {
        let user = UserId::new();
        let mut log = AuditLog::new();
        for _ in 0..150 {
            log.append(entry(AuditEventType::VoteCast, user, 0));
        }
        assert_eq!(log.query(&AuditQuery::default()).len(), MAX_QUERY_LIMIT);
        let got = log.query(&AuditQuery {
            limit: Some(500),
            ..Default::default()
        });
        assert_eq!(got.len(), MAX_QUERY_LIMIT);
        let got = log.query(&AuditQuery {
            limit: Some(7),
            ..Default::default()
        });
        assert_eq!(got.len(), 7);
    }

    #[test]
    fn event_type_parse_roundtrips() {
        for t in [
            AuditEventType::CommandSubmitted,
            AuditEventType::CommandEscalated,
            AuditEventType::CreditsAdjusted,
        ] {
            assert_eq!(AuditEventType::parse(t.as_str()), Some(t));
        }
        assert_eq!(AuditEventType::parse("NOT_A_THING"), None);
    }
}
