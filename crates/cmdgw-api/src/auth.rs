//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! Bearer tokens encode role and user identity:
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}   — full format
//! Bearer {secret}                     — legacy format (treated as admin)
//! ```
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use cmdgw_core::{Role, UserId};

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, extracted from the auth context
/// and available to all route handlers via Axum's `FromRequestParts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// The caller's role in the gateway.
    pub role: Role,
    /// The caller's user ID. `None` for legacy admin tokens, which are not
    /// bound to a user record.
    pub user_id: Option<UserId>,
}

impl CallerIdentity {
    /// Check if the caller has at least the given minimum role.
    ///
    /// `Role` derives `Ord` with `Member < Admin`, so this is a single
    /// comparison.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// The caller's user binding, required for operations that act on
    /// behalf of a specific user (submitting, voting, approving).
    pub fn acting_user(&self) -> Result<UserId, AppError> {
        self.user_id.ok_or_else(|| {
            AppError::Unauthorized("token is not bound to a user".into())
        })
    }
}

/// Axum `FromRequestParts` implementation for `CallerIdentity`.
///
/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present (middleware didn't run or failed).
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer tokens.
///
/// Prevents timing side-channels that could reveal token length or prefix.
/// When lengths differ, performs a dummy comparison to avoid leaking length
/// information through timing variance.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse the bearer token in format `{role}:{user_id}:{secret}` or `{secret}`
/// (legacy).
///
/// Legacy tokens (without role prefix) are treated as `Admin` without a user
/// binding, matching pre-RBAC deployments.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.len() {
        // Legacy format: just the secret.
        1 => {
            if constant_time_token_eq(provided, expected_secret) {
                Ok(CallerIdentity {
                    role: Role::Admin,
                    user_id: None,
                })
            } else {
                Err("invalid bearer token".into())
            }
        }
        // Full format: role:user_id:secret (user_id may be empty)
        3 => {
            let role_str = parts[0];
            let user_str = parts[1];
            let secret = parts[2];

            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }

            let role = Role::parse(role_str).ok_or_else(|| format!("unknown role: {role_str}"))?;

            let user_id = if user_str.is_empty() {
                None
            } else {
                Some(UserId::from_uuid(
                    user_str
                        .parse::<Uuid>()
                        .map_err(|e| format!("invalid user_id: {e}"))?,
                ))
            };

            Ok(CallerIdentity { role, user_id })
        }
        _ => Err("invalid token format — expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Extract and validate the Bearer token from the Authorization header.
///
/// Parses the token to extract `CallerIdentity` (role + user binding) and
/// injects it into request extensions for downstream handlers.
///
/// When `AuthConfig.token` is `None`, all requests are allowed with `Admin`
/// identity (auth disabled / development mode).
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header {
                Some(header_value) if header_value.starts_with("Bearer ") => {
                    let provided = &header_value[7..];
                    match parse_bearer_token(provided, expected) {
                        Ok(identity) => {
                            request.extensions_mut().insert(identity);
                            next.run(request).await
                        }
                        Err(msg) => {
                            tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                            unauthorized_response(&msg)
                        }
                    }
                }
                Some(_) => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            // Auth disabled — inject Admin identity for full access.
            request.extensions_mut().insert(CallerIdentity {
                role: Role::Admin,
                user_id: None,
            });
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Build a minimal router with the auth middleware and a simple handler.
    fn test_app(token: Option<String>) -> Router {
        let auth_config = AuthConfig { token };
        Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    #[tokio::test]
    async fn valid_bearer_token_accepted() {
        let app = test_app(Some("my-secret".to_string()));

        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer my-secret")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn missing_authorization_header_rejected() {
        let app = test_app(Some("my-secret".to_string()));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"]
            .as_str()
            .unwrap()
            .contains("missing"));
    }

    #[tokio::test]
    async fn invalid_token_rejected() {
        let app = test_app(Some("my-secret".to_string()));

        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer wrong-token")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let app = test_app(Some("my-secret".to_string()));

        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(err["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn auth_disabled_allows_all_requests() {
        let app = test_app(None);

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn auth_disabled_ignores_provided_token() {
        let app = test_app(None);

        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer anything")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn constant_time_eq_identical_tokens() {
        assert!(constant_time_token_eq(
            "secret-token-123",
            "secret-token-123"
        ));
    }

    #[test]
    fn constant_time_eq_rejects_wrong_token() {
        assert!(!constant_time_token_eq("wrong-token", "secret-token-123"));
    }

    #[test]
    fn constant_time_eq_rejects_prefix() {
        assert!(!constant_time_token_eq("secret", "secret-token-123"));
    }

    #[test]
    fn constant_time_eq_rejects_empty() {
        assert!(!constant_time_token_eq("", "secret-token-123"));
    }

    #[test]
    fn has_role_admin_has_everything() {
        let admin = CallerIdentity {
            role: Role::Admin,
            user_id: None,
        };
        assert!(admin.has_role(Role::Member));
        assert!(admin.has_role(Role::Admin));
    }

    #[test]
    fn has_role_member_only_has_own_level() {
        let member = CallerIdentity {
            role: Role::Member,
            user_id: Some(UserId::new()),
        };
        assert!(member.has_role(Role::Member));
        assert!(!member.has_role(Role::Admin));
    }

    #[test]
    fn acting_user_requires_binding() {
        let unbound = CallerIdentity {
            role: Role::Admin,
            user_id: None,
        };
        assert!(unbound.acting_user().is_err());

        let id = UserId::new();
        let bound = CallerIdentity {
            role: Role::Member,
            user_id: Some(id),
        };
        assert_eq!(bound.acting_user().unwrap(), id);
    }

    #[test]
    fn require_role_passes_for_sufficient_role() {
        let caller = CallerIdentity {
            role: Role::Admin,
            user_id: None,
        };
        assert!(require_role(&caller, Role::Member).is_ok());
    }

    #[test]
    fn require_role_fails_for_insufficient_role() {
        let caller = CallerIdentity {
            role: Role::Member,
            user_id: Some(UserId::new()),
        };
        assert!(require_role(&caller, Role::Admin).is_err());
    }

    #[test]
    fn parse_bearer_token_legacy_format() {
        let identity = parse_bearer_token("my-secret", "my-secret").unwrap();
        assert_eq!(identity.role, Role::Admin);
        assert!(identity.user_id.is_none());
    }

    #[test]
    fn parse_bearer_token_full_format_admin() {
        let identity = parse_bearer_token("admin::my-secret", "my-secret").unwrap();
        assert_eq!(identity.role, Role::Admin);
        assert!(identity.user_id.is_none());
    }

    #[test]
    fn parse_bearer_token_full_format_member() {
        let identity = parse_bearer_token(
            "member:550e8400-e29b-41d4-a716-446655440000:my-secret",
            "my-secret",
        )
        .unwrap();
        assert_eq!(identity.role, Role::Member);
        assert_eq!(
            identity.user_id.unwrap().to_string(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn parse_bearer_token_wrong_secret() {
        let result = parse_bearer_token("admin::wrong", "my-secret");
        assert!(result.is_err());
    }

    #[test]
    fn parse_bearer_token_unknown_role() {
        let result = parse_bearer_token("superadmin::my-secret", "my-secret");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("unknown role"));
    }

    #[test]
    fn parse_bearer_token_invalid_uuid() {
        let result = parse_bearer_token("member:not-a-uuid:my-secret", "my-secret");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("invalid user_id"));
    }

    #[test]
    fn parse_bearer_token_two_parts_rejected() {
        let result = parse_bearer_token("role:secret", "secret");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn middleware_full_format_member_accepted() {
        let app = test_app(Some("my-secret".to_string()));

        let request = Request::builder()
            .uri("/test")
            .header(
                "Authorization",
                "Bearer member:550e8400-e29b-41d4-a716-446655440000:my-secret",
            )
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn middleware_unknown_role_rejected() {
        let app = test_app(Some("my-secret".to_string()));

        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer superadmin::my-secret")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn middleware_invalid_uuid_rejected() {
        let app = test_app(Some("my-secret".to_string()));

        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer member:not-a-uuid:my-secret")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
