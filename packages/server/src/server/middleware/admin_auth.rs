use crate::domains::auth::{Claims, JwtService};
use axum::{http::StatusCode, middleware::Next, response::Response};
use std::sync::Arc;
use tracing::debug;

/// Authenticated operator from an admin JWT
#[derive(Clone, Debug)]
pub struct AdminUser {
    pub subject: String,
}

/// Admin authentication middleware
///
/// Requires an `Authorization` header holding a valid token with the admin
/// role. Missing or invalid tokens get 401, valid non-admin tokens get 403.
/// On success the AdminUser is added to request extensions.
pub async fn require_admin(
    jwt_service: Arc<JwtService>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = extract_claims(&request, &jwt_service).ok_or(StatusCode::UNAUTHORIZED)?;

    if !claims.is_admin() {
        debug!(subject = %claims.sub, role = %claims.role, "admin route refused");
        return Err(StatusCode::FORBIDDEN);
    }

    debug!(subject = %claims.sub, "admin authenticated");
    request.extensions_mut().insert(AdminUser { subject: claims.sub });
    Ok(next.run(request).await)
}

/// Extract and verify JWT token from request
fn extract_claims(
    request: &axum::http::Request<axum::body::Body>,
    jwt_service: &JwtService,
) -> Option<Claims> {
    let auth_header = request.headers().get("authorization")?;
    let auth_str = auth_header.to_str().ok()?;

    // Extract token (handle both "Bearer <token>" and raw token)
    let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
    if token.is_empty() {
        return None;
    }

    jwt_service.verify_token(token).ok()
}
