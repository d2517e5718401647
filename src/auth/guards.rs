//! Per-request authentication pipeline.
//!
//! Runs once per inbound request at the edge gateway and again inside every
//! internal service: an internal service reachable directly must never
//! treat gateway-injected headers as its sole authentication factor.

use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::AuthState;
use crate::auth::error::AuthError;
use crate::auth::responses::Role;
use crate::auth::tokens::TokenKind;

/// Informational identity headers the gateway attaches for downstream
/// services. Never read as proof of identity; services re-verify tokens.
pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_EMAIL_HEADER: &str = "X-User-Email";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Immutable per-request identity derived from a verified token.
///
/// Constructed once when the first guard runs, cached for the rest of the
/// request, and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestIdentity {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Role,
    pub is_service_caller: bool,
}

impl RequestIdentity {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

/// The pipeline's soft guard: always succeeds, yielding `None` for
/// anonymous requests.
///
/// A missing header, malformed scheme, invalid or expired token, or a
/// token of the wrong kind all resolve to anonymous rather than an error,
/// so public routes stay reachable even with a garbage token attached.
/// Hard "must be authenticated" decisions belong to the guards layered on
/// top of this one.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct ClientIdentity(pub Option<RequestIdentity>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIdentity {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let identity = request.local_cache(|| establish_identity(request));
        Outcome::Success(ClientIdentity(identity.clone()))
    }
}

/// Hard guard: the request must carry a verified ACCESS or SERVICE token.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthenticatedUser(pub RequestIdentity);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match ClientIdentity::from_request(request).await {
            Outcome::Success(ClientIdentity(Some(identity))) => {
                Outcome::Success(AuthenticatedUser(identity))
            }
            _ => Outcome::Error((Status::Unauthorized, AuthError::Unauthorized)),
        }
    }
}

/// Hard guard: authenticated with the ADMIN role.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct RequireAdmin(pub RequestIdentity);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireAdmin {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthenticatedUser::from_request(request).await {
            Outcome::Success(AuthenticatedUser(identity)) => {
                if identity.is_admin() {
                    Outcome::Success(RequireAdmin(identity))
                } else {
                    Outcome::Error((Status::Forbidden, AuthError::Forbidden))
                }
            }
            _ => Outcome::Error((Status::Unauthorized, AuthError::Unauthorized)),
        }
    }
}

/// Hard guard: the caller must be another internal service holding a
/// SERVICE-kind token; end-user access tokens are rejected.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct ServiceCaller(pub RequestIdentity);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ServiceCaller {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthenticatedUser::from_request(request).await {
            Outcome::Success(AuthenticatedUser(identity)) if identity.is_service_caller => {
                Outcome::Success(ServiceCaller(identity))
            }
            _ => Outcome::Error((Status::Unauthorized, AuthError::Unauthorized)),
        }
    }
}

fn establish_identity(request: &Request<'_>) -> Option<RequestIdentity> {
    let token = bearer_token_from_request(request)?;

    let state = match request.rocket().state::<AuthState>() {
        Some(state) => state,
        None => {
            log::error!("AuthState missing from managed state");
            return None;
        }
    };

    let claims = match state.token_service.verify(token) {
        Ok(claims) => claims,
        Err(_) => {
            log::debug!("request carried an invalid or expired token");
            return None;
        }
    };

    // Kind is a claim, checked explicitly: a structurally valid REFRESH
    // token establishes no identity for API access.
    match claims.kind {
        TokenKind::Access | TokenKind::Service => {}
        TokenKind::Refresh => {
            log::debug!("refresh token presented for API access");
            return None;
        }
    }

    Some(RequestIdentity {
        user_id: claims.sub,
        email: claims.email,
        role: claims.role,
        is_service_caller: claims.kind == TokenKind::Service,
    })
}

fn bearer_token_from_request<'r>(request: &'r Request<'_>) -> Option<&'r str> {
    let header = request.headers().get_one("Authorization")?;
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// The informational header triple a gateway forwards downstream.
pub fn identity_headers(identity: &RequestIdentity) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        (USER_ID_HEADER, identity.user_id.clone()),
        (USER_ROLE_HEADER, identity.role.as_str().to_string()),
    ];
    if let Some(email) = &identity.email {
        headers.insert(1, (USER_EMAIL_HEADER, email.clone()));
    }
    headers
}
