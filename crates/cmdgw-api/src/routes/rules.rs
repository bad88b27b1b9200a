//! # Rule Management API
//!
//! Admin-only rule CRUD and advisory conflict probing.
//!
//! ## Endpoints
//!
//! - `POST /v1/rules` — create a rule
//! - `GET /v1/rules` — list rules in precedence order
//! - `GET /v1/rules/:id` — get a rule
//! - `PATCH /v1/rules/:id` — update a rule
//! - `DELETE /v1/rules/:id` — delete a rule
//! - `POST /v1/rules/conflicts` — probe a candidate pattern for conflicts

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cmdgw_core::{Role, RuleId, UserId};
use cmdgw_rules::{
    EscalationPolicy, Rule, RuleAction, RuleConflict, Schedule,
};
use cmdgw_engine::RuleUpdate;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// Request to create a rule.
#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    /// Regex pattern the command text is matched against.
    pub pattern: String,
    /// Outcome when the pattern matches.
    pub action: RuleAction,
    /// Higher priority wins. Defaults to 0.
    #[serde(default)]
    pub priority: i64,
    /// Per-command cost; omitted means the default cost.
    pub cost: Option<i64>,
    /// Activation schedule; omitted means always active.
    pub schedule: Option<Schedule>,
    /// Restrict to a single submitter.
    pub restricted_to_user: Option<Uuid>,
    /// Restrict to submitters holding this role.
    pub restricted_to_role: Option<Role>,
    /// Timeout behavior for pending commands.
    pub escalation: Option<EscalationPolicy>,
    /// Approve-vote count that auto-approves a pending command.
    pub voting_threshold: Option<u32>,
}

impl Validate for CreateRuleRequest {
    fn validate(&self) -> Result<(), String> {
        if self.pattern.trim().is_empty() {
            return Err("pattern must not be empty".to_string());
        }
        if self.voting_threshold == Some(0) {
            return Err("voting_threshold must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Request to probe a candidate rule for conflicts with existing rules.
#[derive(Debug, Deserialize)]
pub struct ConflictProbeRequest {
    /// Candidate regex pattern.
    pub pattern: String,
    /// Candidate action.
    pub action: RuleAction,
    /// Exclude this rule from the probe (when updating an existing rule).
    pub exclude_rule_id: Option<Uuid>,
}

/// Conflict probe response.
#[derive(Debug, Serialize)]
pub struct ConflictProbeResponse {
    pub conflicts: Vec<RuleConflict>,
}

/// Response wrapper for rule lists.
#[derive(Debug, Serialize)]
pub struct RuleListResponse {
    pub rules: Vec<Rule>,
}

// ── Router ──────────────────────────────────────────────────────────

/// Build the rules router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/rules", get(list_rules).post(create_rule))
        .route(
            "/v1/rules/:id",
            get(get_rule).patch(update_rule).delete(delete_rule),
        )
        .route("/v1/rules/conflicts", post(probe_conflicts))
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/rules — Create a rule.
async fn create_rule(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateRuleRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<Rule>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let created_by = caller.acting_user()?;

    let mut rule = Rule::new(req.pattern, req.action, created_by).with_priority(req.priority);
    rule.cost = req.cost;
    if let Some(schedule) = req.schedule {
        rule.schedule = schedule;
    }
    rule.restricted_to_user = req.restricted_to_user.map(UserId::from_uuid);
    rule.restricted_to_role = req.restricted_to_role;
    rule.escalation = req.escalation;
    rule.voting_threshold = req.voting_threshold;

    let stored = state.gateway.create_rule(rule, Utc::now())?;
    Ok((axum::http::StatusCode::CREATED, Json(stored)))
}

/// GET /v1/rules — List rules in matching precedence order.
async fn list_rules(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<RuleListResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(RuleListResponse {
        rules: state.gateway.list_rules(),
    }))
}

/// GET /v1/rules/:id — Get a single rule.
async fn get_rule(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Rule>, AppError> {
    require_role(&caller, Role::Admin)?;
    let rule = state.gateway.get_rule(RuleId::from_uuid(id))?;
    Ok(Json(rule))
}

/// PATCH /v1/rules/:id — Partially update a rule.
async fn update_rule(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RuleUpdate>, JsonRejection>,
) -> Result<Json<Rule>, AppError> {
    require_role(&caller, Role::Admin)?;
    let update = extract_json(body)?;
    let actor = caller.acting_user()?;

    let rule = state
        .gateway
        .update_rule(RuleId::from_uuid(id), update, actor, Utc::now())?;
    Ok(Json(rule))
}

/// DELETE /v1/rules/:id — Delete a rule.
async fn delete_rule(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;
    let actor = caller.acting_user()?;

    state
        .gateway
        .delete_rule(RuleId::from_uuid(id), actor, Utc::now())?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// POST /v1/rules/conflicts — Probe a candidate pattern and action for
/// overlaps with existing enabled rules. Advisory only.
async fn probe_conflicts(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ConflictProbeRequest>, JsonRejection>,
) -> Result<Json<ConflictProbeResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_json(body)?;

    let conflicts = state.gateway.detect_rule_conflicts(
        &req.pattern,
        req.action,
        req.exclude_rule_id.map(RuleId::from_uuid),
    );
    Ok(Json(ConflictProbeResponse { conflicts }))
}
