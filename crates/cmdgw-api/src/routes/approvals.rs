//! # Approval Queue API
//!
//! Handles the approval workflow for commands parked in `needs_approval`:
//! voting, manual approval, and rejection.
//!
//! ## Endpoints
//!
//! - `GET /v1/approvals` — pending commands with vote tallies (admin)
//! - `POST /v1/commands/:id/votes` — cast or replace a vote (admin)
//! - `POST /v1/commands/:id/approve` — approve and execute (admin)
//! - `POST /v1/commands/:id/reject` — reject with a reason (admin)

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cmdgw_core::{CommandId, Role};
use cmdgw_engine::{CommandRecord, PendingApproval, VoteOutcome, VoteType};

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// Request to cast a vote on a pending command.
#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    /// `approve` or `reject`.
    pub vote: VoteType,
}

/// Request to approve a pending command.
#[derive(Debug, Default, Deserialize)]
pub struct ApproveCommandRequest {
    /// Optional approval note, recorded on the command.
    pub reason: Option<String>,
}

/// Request to reject a pending command.
#[derive(Debug, Deserialize)]
pub struct RejectCommandRequest {
    /// Mandatory rejection reason.
    pub reason: String,
}

impl Validate for RejectCommandRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("reason must not be empty".to_string());
        }
        Ok(())
    }
}

/// Response wrapper for the approval queue.
#[derive(Debug, Serialize)]
pub struct ApprovalQueueResponse {
    pub pending: Vec<PendingApproval>,
}

// ── Router ──────────────────────────────────────────────────────────

/// Build the approvals router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/approvals", get(list_pending))
        .route("/v1/commands/:id/votes", post(cast_vote))
        .route("/v1/commands/:id/approve", post(approve_command))
        .route("/v1/commands/:id/reject", post(reject_command))
}

// ── Handlers ────────────────────────────────────────────────────────

/// GET /v1/approvals — Pending commands with tallies, oldest first.
async fn list_pending(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ApprovalQueueResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(ApprovalQueueResponse {
        pending: state.gateway.pending_approvals(),
    }))
}

/// POST /v1/commands/:id/votes — Cast or replace a vote.
async fn cast_vote(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<CastVoteRequest>, JsonRejection>,
) -> Result<Json<VoteOutcome>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_json(body)?;
    let voter = caller.acting_user()?;

    let outcome =
        state
            .gateway
            .cast_vote(CommandId::from_uuid(id), voter, req.vote, Utc::now())?;
    Ok(Json(outcome))
}

/// POST /v1/commands/:id/approve — Approve and execute (mocked).
async fn approve_command(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ApproveCommandRequest>, JsonRejection>,
) -> Result<Json<CommandRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_json(body)?;
    let approver = caller.acting_user()?;

    let record = state.gateway.approve_command(
        CommandId::from_uuid(id),
        approver,
        req.reason,
        Utc::now(),
    )?;
    Ok(Json(record))
}

/// POST /v1/commands/:id/reject — Reject with a mandatory reason.
async fn reject_command(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RejectCommandRequest>, JsonRejection>,
) -> Result<Json<CommandRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let approver = caller.acting_user()?;

    let record = state.gateway.reject_command(
        CommandId::from_uuid(id),
        approver,
        &req.reason,
        Utc::now(),
    )?;
    Ok(Json(record))
}
