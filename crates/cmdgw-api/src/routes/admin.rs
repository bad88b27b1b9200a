//! # User, Credit, and Audit Administration API
//!
//! Admin-only endpoints for user registration, credit adjustments, and
//! audit log queries.
//!
//! ## Endpoints
//!
//! - `POST /v1/users` — register a user
//! - `GET /v1/users` — list users with balances
//! - `GET /v1/users/:id` — get a user with balance
//! - `POST /v1/users/:id/credits` — adjust a user's balance
//! - `GET /v1/audit` — query the audit log

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cmdgw_core::{CommandId, Role, UserId};
use cmdgw_engine::{AuditEntry, AuditEventType, AuditQuery, UserWithBalance};

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// Request to register a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Role; defaults to member.
    pub role: Option<Role>,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.email.trim().is_empty() {
            return Err("email must not be empty".to_string());
        }
        Ok(())
    }
}

/// Request to adjust a user's credit balance.
#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    /// Signed amount; positive grants, negative debits.
    pub amount: i64,
    /// Optional note recorded in the audit log.
    pub reason: Option<String>,
}

impl Validate for AdjustCreditsRequest {
    fn validate(&self) -> Result<(), String> {
        if self.amount == 0 {
            return Err("amount must not be zero".to_string());
        }
        Ok(())
    }
}

/// Adjustment response.
#[derive(Debug, Serialize)]
pub struct AdjustCreditsResponse {
    pub user_id: UserId,
    pub new_balance: i64,
}

/// Query filters for the audit log.
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub user_id: Option<Uuid>,
    pub command_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Response wrapper for audit queries.
#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub entries: Vec<AuditEntry>,
}

/// Response wrapper for user lists.
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserWithBalance>,
}

// ── Router ──────────────────────────────────────────────────────────

/// Build the administration router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users", get(list_users).post(create_user))
        .route("/v1/users/:id", get(get_user))
        .route("/v1/users/:id/credits", post(adjust_credits))
        .route("/v1/audit", get(query_audit))
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/users — Register a user.
async fn create_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(axum::http::StatusCode, Json<UserWithBalance>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;

    let user = state.gateway.create_user(
        req.name,
        req.email,
        req.role.unwrap_or(Role::Member),
        Utc::now(),
    );
    let balance = state.gateway.balance_of(user.id);
    Ok((
        axum::http::StatusCode::CREATED,
        Json(UserWithBalance { user, balance }),
    ))
}

/// GET /v1/users — List users with balances, oldest first.
async fn list_users(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<UserListResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(UserListResponse {
        users: state.gateway.list_users(),
    }))
}

/// GET /v1/users/:id — Get a user with balance.
async fn get_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<UserWithBalance>, AppError> {
    let user_id = UserId::from_uuid(id);

    // Members may look up themselves; everything else is admin only.
    if !caller.has_role(Role::Admin) && caller.user_id != Some(user_id) {
        return Err(AppError::Forbidden(
            "members may only view their own user record".to_string(),
        ));
    }

    let user = state.gateway.get_user(user_id)?;
    let balance = state.gateway.balance_of(user_id);
    Ok(Json(UserWithBalance { user, balance }))
}

/// POST /v1/users/:id/credits — Adjust a user's balance.
async fn adjust_credits(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<AdjustCreditsRequest>, JsonRejection>,
) -> Result<Json<AdjustCreditsResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let user_id = UserId::from_uuid(id);

    let new_balance = state
        .gateway
        .adjust_credits(user_id, req.amount, req.reason, Utc::now())?;
    Ok(Json(AdjustCreditsResponse {
        user_id,
        new_balance,
    }))
}

/// GET /v1/audit — Query the audit log, newest first.
async fn query_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<AuditLogResponse>, AppError> {
    require_role(&caller, Role::Admin)?;

    let event_type = match query.event_type.as_deref() {
        Some(s) => Some(
            AuditEventType::parse(s)
                .ok_or_else(|| AppError::Validation(format!("unknown event_type: {s}")))?,
        ),
        None => None,
    };

    let entries = state.gateway.audit_entries(&AuditQuery {
        user_id: query.user_id.map(UserId::from_uuid),
        command_id: query.command_id.map(CommandId::from_uuid),
        event_type,
        from: query.from,
        to: query.to,
        limit: query.limit,
    });
    Ok(Json(AuditLogResponse { entries }))
}
