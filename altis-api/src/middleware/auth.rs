use altis_core::Requester;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

pub const CUSTOMER_ROLE: &str = "CUSTOMER";
pub const GUEST_ROLE: &str = "GUEST";
pub const SERVICE_ROLE: &str = "SERVICE";
pub const ADMIN_ROLE: &str = "ADMIN";

/// Header carrying an anonymous browsing session when no token is sent.
pub const SESSION_HEADER: &str = "X-Session-Id";

// Lock owners are namespaced by how the caller was identified, so a session
// id chosen by the client can never equal a customer subject.
const CUSTOMER_OWNER_PREFIX: &str = "customer:";
const SESSION_OWNER_PREFIX: &str = "session:";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomerClaims {
    pub sub: String,
    pub email: Option<String>,
    pub role: String,
    pub exp: usize,
}

/// `Ok(None)` when no Authorization header is present at all.
fn bearer_claims(headers: &HeaderMap, secret: &str) -> Result<Option<CustomerClaims>, AppError> {
    let Some(auth_header) = headers.get("Authorization") else {
        return Ok(None);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Malformed Authorization header".to_string()))?;

    let token_data = decode::<CustomerClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthenticationError("Invalid or expired token".to_string()))?;

    Ok(Some(token_data.claims))
}

// ============================================================================
// Seat Callers
// ============================================================================

/// Anyone allowed to view and lock seats: a signed-in customer, a guest
/// token, or a bare session header.
///
/// A guest token and a session header naming the same session resolve to
/// the same owner.
#[derive(Debug, Clone)]
pub struct Caller(pub Requester);

impl Caller {
    pub fn owner_id(&self) -> &str {
        self.0.owner_id()
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(claims) = bearer_claims(&parts.headers, &state.auth.secret)? {
            return match claims.role.as_str() {
                CUSTOMER_ROLE => Ok(Caller(Requester::Customer(format!("{CUSTOMER_OWNER_PREFIX}{}", claims.sub)))),
                GUEST_ROLE => Ok(Caller(Requester::Guest(format!("{SESSION_OWNER_PREFIX}{}", claims.sub)))),
                _ => Err(AppError::AuthorizationError("Role cannot hold seats".to_string())),
            };
        }

        let session = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::AuthenticationError("Missing token or session id".to_string()))?;

        Ok(Caller(Requester::Guest(format!("{SESSION_OWNER_PREFIX}{session}"))))
    }
}

// ============================================================================
// Back-office Callers
// ============================================================================

fn require_role(parts: &Parts, state: &AppState, allowed: &[&str]) -> Result<CustomerClaims, AppError> {
    let claims = bearer_claims(&parts.headers, &state.auth.secret)?
        .ok_or_else(|| AppError::AuthenticationError("Missing token".to_string()))?;

    if !allowed.contains(&claims.role.as_str()) {
        return Err(AppError::AuthorizationError(format!("Role {} is not permitted", claims.role)));
    }
    Ok(claims)
}

/// The booking subsystem or an operator.
#[derive(Debug, Clone)]
pub struct ServiceCaller(pub CustomerClaims);

impl FromRequestParts<AppState> for ServiceCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        require_role(parts, state, &[SERVICE_ROLE, ADMIN_ROLE]).map(ServiceCaller)
    }
}

#[derive(Debug, Clone)]
pub struct AdminCaller(pub CustomerClaims);

impl FromRequestParts<AppState> for AdminCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        require_role(parts, state, &[ADMIN_ROLE]).map(AdminCaller)
    }
}
