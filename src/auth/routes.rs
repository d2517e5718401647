use chrono::{DateTime, Utc};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use uuid::Uuid;

use crate::auth::guards::{AuthenticatedUser, RequireAdmin, ServiceCaller};
use crate::auth::responses::{
    AccountStatusResponse, AccountSummary, AuthResponse, IdentityResponse, LoginRequest,
    RefreshRequest, RegisterRequest, Role,
};
use crate::auth::store::{CredentialRecord, NewCredential};
use crate::auth::{AuthError, AuthState};

type AuthRouteResult<T> = Result<Json<T>, status::Custom<Json<AuthErrorResponse>>>;

#[derive(Debug, serde::Serialize, serde::Deserialize, JsonSchema)]
pub struct AuthErrorResponse {
    pub status: u16,
    pub message: String,
    /// Present only for lockout errors, so legitimate users know when to
    /// retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<payload>")]
pub async fn register(
    state: &State<AuthState>,
    payload: Json<RegisterRequest>,
) -> AuthRouteResult<AccountSummary> {
    let email = payload.email.trim().to_lowercase();
    let name = payload.name.trim().to_string();

    if email.is_empty() || name.is_empty() {
        return Err(respond_message(
            Status::BadRequest,
            "Email and name are required",
        ));
    }

    // Policy violations surface before any hashing happens.
    let password_hash = state
        .password_service
        .hash_password(&payload.password)
        .map_err(respond_error)?;

    let record = state
        .store
        .insert(NewCredential {
            email,
            name,
            password_hash,
            role: Role::Customer,
        })
        .await
        .map_err(respond_error)?;

    log::info!("registered account {}", record.id);

    Ok(Json(summary(&record)))
}

#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    payload: Json<LoginRequest>,
) -> AuthRouteResult<AuthResponse> {
    let email = payload.email.trim().to_lowercase();
    let password = payload.password.as_str();

    if email.is_empty() || password.is_empty() {
        return Err(respond_message(
            Status::BadRequest,
            "Email and password are required",
        ));
    }

    let record = state
        .authenticator
        .authenticate(&email, password)
        .await
        .map_err(respond_error)?;

    issue_token_pair(state, &record).map(Json).map_err(respond_error)
}

#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<payload>")]
pub async fn refresh(
    state: &State<AuthState>,
    payload: Json<RefreshRequest>,
) -> AuthRouteResult<AuthResponse> {
    let claims = state
        .token_service
        .verify(&payload.refresh_token)
        .map_err(respond_error)?;

    if !claims.is_refresh_token() {
        return Err(respond_error(AuthError::TokenInvalid));
    }

    // Anything that prevents reconstructing a live account collapses into
    // the uniform token error; a refresh call is not a probing oracle.
    let account_id =
        Uuid::parse_str(&claims.sub).map_err(|_| respond_error(AuthError::TokenInvalid))?;

    let record = state
        .store
        .find_by_id(account_id)
        .await
        .map_err(respond_error)?
        .ok_or_else(|| respond_error(AuthError::TokenInvalid))?;

    if !can_log_in(&record, Utc::now()) {
        return Err(respond_error(AuthError::TokenInvalid));
    }

    log::info!("token refreshed for account {}", record.id);

    issue_token_pair(state, &record).map(Json).map_err(respond_error)
}

#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(user: AuthenticatedUser) -> Json<IdentityResponse> {
    let identity = user.0;
    Json(IdentityResponse {
        user_id: identity.user_id,
        email: identity.email,
        role: identity.role,
        is_service_caller: identity.is_service_caller,
    })
}

#[openapi(tag = "Accounts")]
#[post("/accounts/<id>/suspend")]
pub async fn suspend_account(
    state: &State<AuthState>,
    _admin: RequireAdmin,
    id: &str,
) -> AuthRouteResult<AccountStatusResponse> {
    let account_id = parse_account_id(id)?;
    let record = state
        .authenticator
        .suspend(account_id)
        .await
        .map_err(respond_error)?;

    log::info!("account {} suspended", record.id);

    Ok(Json(status_of(&record)))
}

#[openapi(tag = "Accounts")]
#[post("/accounts/<id>/reactivate")]
pub async fn reactivate_account(
    state: &State<AuthState>,
    _admin: RequireAdmin,
    id: &str,
) -> AuthRouteResult<AccountStatusResponse> {
    let account_id = parse_account_id(id)?;
    let record = state
        .authenticator
        .reactivate(account_id)
        .await
        .map_err(respond_error)?;

    log::info!("account {} reactivated", record.id);

    Ok(Json(status_of(&record)))
}

/// Account status lookup for other services, e.g. an order service
/// checking a customer before accepting a checkout. Requires a
/// SERVICE-kind token; end-user tokens are rejected.
#[openapi(tag = "Internal")]
#[get("/internal/accounts/<id>/status")]
pub async fn account_status(
    state: &State<AuthState>,
    caller: ServiceCaller,
    id: &str,
) -> AuthRouteResult<AccountStatusResponse> {
    let account_id = parse_account_id(id)?;
    let record = state
        .store
        .find_by_id(account_id)
        .await
        .map_err(respond_error)?
        .ok_or_else(|| respond_error(AuthError::AccountNotFound))?;

    log::debug!(
        "account {} status read by service {}",
        record.id,
        caller.0.user_id
    );

    Ok(Json(status_of(&record)))
}

fn issue_token_pair(state: &AuthState, record: &CredentialRecord) -> Result<AuthResponse, AuthError> {
    let access = state
        .token_service
        .issue_access_token(record.id, &record.email, record.role)?;
    let refresh = state
        .token_service
        .issue_refresh_token(record.id, &record.email, record.role)?;

    Ok(AuthResponse {
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.access_token_ttl_secs,
        user: summary(record),
    })
}

fn can_log_in(record: &CredentialRecord, now: DateTime<Utc>) -> bool {
    use crate::auth::lockout::AccountStatus;
    match record.security.status {
        AccountStatus::Active => true,
        AccountStatus::Locked => !record.security.is_locked(now),
        AccountStatus::Suspended | AccountStatus::PendingVerification => false,
    }
}

fn summary(record: &CredentialRecord) -> AccountSummary {
    AccountSummary {
        id: record.id,
        email: record.email.clone(),
        name: record.name.clone(),
        role: record.role,
    }
}

fn status_of(record: &CredentialRecord) -> AccountStatusResponse {
    AccountStatusResponse {
        id: record.id,
        status: record.security.status.as_str().to_string(),
        failed_attempts: record.security.failed_attempts,
        locked_until: record.security.locked_until,
    }
}

fn parse_account_id(id: &str) -> Result<Uuid, status::Custom<Json<AuthErrorResponse>>> {
    Uuid::parse_str(id).map_err(|_| respond_error(AuthError::AccountNotFound))
}

fn respond_error(err: AuthError) -> status::Custom<Json<AuthErrorResponse>> {
    let status = err.status();
    let message = if status == Status::InternalServerError {
        // Never leak store or crypto internals to the caller.
        log::error!("auth request failed: {err}");
        "internal error".to_string()
    } else {
        err.to_string()
    };

    let locked_until = match &err {
        AuthError::AccountLocked { until } => Some(*until),
        _ => None,
    };

    status::Custom(
        status,
        Json(AuthErrorResponse {
            status: status.code,
            message,
            locked_until,
        }),
    )
}

fn respond_message(
    status: Status,
    message: impl Into<String>,
) -> status::Custom<Json<AuthErrorResponse>> {
    status::Custom(
        status,
        Json(AuthErrorResponse {
            status: status.code,
            message: message.into(),
            locked_until: None,
        }),
    )
}
