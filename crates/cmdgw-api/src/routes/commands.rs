//! # Command Submission API
//!
//! Handles command submission through the admission pipeline and
//! command queries.
//!
//! ## Endpoints
//!
//! - `POST /v1/commands` — submit a command
//! - `GET /v1/commands` — list commands
//! - `GET /v1/commands/:id` — get a command
//!
//! Members only see their own commands; admins see everything.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cmdgw_core::{CommandId, Role, UserId};
use cmdgw_engine::{CommandRecord, CommandStatus, SubmissionOutcome};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// Request to submit a command.
#[derive(Debug, Deserialize)]
pub struct SubmitCommandRequest {
    /// Free-text command to run.
    pub command_text: String,
    /// Submit on behalf of this user. Admin tokens only; member tokens
    /// always submit as themselves.
    pub user_id: Option<Uuid>,
}

impl Validate for SubmitCommandRequest {
    fn validate(&self) -> Result<(), String> {
        if self.command_text.trim().is_empty() {
            return Err("command_text must not be empty".to_string());
        }
        Ok(())
    }
}

/// Query filters for listing commands.
#[derive(Debug, Default, Deserialize)]
pub struct ListCommandsQuery {
    /// Only commands submitted by this user.
    pub user_id: Option<Uuid>,
    /// Only commands in this status.
    pub status: Option<CommandStatus>,
}

/// Response wrapper for command lists.
#[derive(Debug, Serialize)]
pub struct CommandListResponse {
    pub commands: Vec<CommandRecord>,
}

// ── Router ──────────────────────────────────────────────────────────

/// Build the commands router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/commands", get(list_commands).post(submit_command))
        .route("/v1/commands/:id", get(get_command))
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/commands — Submit a command through the admission pipeline.
async fn submit_command(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SubmitCommandRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<SubmissionOutcome>), AppError> {
    let req = extract_validated_json(body)?;

    // Member tokens submit as themselves. Admins may name another user.
    let submitter = match (caller.role, req.user_id) {
        (Role::Admin, Some(id)) => UserId::from_uuid(id),
        _ => caller.acting_user()?,
    };

    let outcome = state
        .gateway
        .submit_command(submitter, &req.command_text, Utc::now())?;
    Ok((axum::http::StatusCode::CREATED, Json(outcome)))
}

/// GET /v1/commands — List commands, newest first.
async fn list_commands(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ListCommandsQuery>,
) -> Result<Json<CommandListResponse>, AppError> {
    // Members are scoped to their own commands regardless of the filter.
    let user_filter = if caller.has_role(Role::Admin) {
        query.user_id.map(UserId::from_uuid)
    } else {
        Some(caller.acting_user()?)
    };

    let commands = state.gateway.list_commands(user_filter, query.status);
    Ok(Json(CommandListResponse { commands }))
}

/// GET /v1/commands/:id — Get a single command.
async fn get_command(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<CommandRecord>, AppError> {
    let command = state.gateway.get_command(CommandId::from_uuid(id))?;

    if !caller.has_role(Role::Admin) && Some(command.user_id) != caller.user_id {
        return Err(AppError::Forbidden(
            "members may only view their own commands".to_string(),
        ));
    }

    Ok(Json(command))
}
