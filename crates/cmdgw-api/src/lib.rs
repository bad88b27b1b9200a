//! # cmdgw-api — Axum HTTP Surface for the Command Gateway
//!
//! Exposes the gateway engine over HTTP: command submission, the approval
//! queue, rule administration, user and credit management, and audit
//! queries.
//!
//! ## API Surface
//!
//! | Prefix              | Module                 | Domain                  |
//! |---------------------|------------------------|-------------------------|
//! | `/v1/commands/*`    | [`routes::commands`]   | Admission pipeline      |
//! | `/v1/approvals`     | [`routes::approvals`]  | Approval queue & votes  |
//! | `/v1/rules/*`       | [`routes::rules`]      | Rule administration     |
//! | `/v1/users/*`       | [`routes::admin`]      | Users & credits         |
//! | `/v1/audit`         | [`routes::admin`]      | Audit log               |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod sweeper;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::commands::router())
        .merge(routes::approvals::router())
        .merge(routes::rules::router())
        .merge(routes::admin::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state);

    // Unauthenticated health probes.
    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — returns 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}
