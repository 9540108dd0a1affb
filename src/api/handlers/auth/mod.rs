//! Login, logout, and token-status endpoints for the three client surfaces.
//!
//! The order of checks inside a login attempt is load-bearing: envelope
//! first, then the lock state (before any credential comparison), then the
//! CAPTCHA challenge on the public surface, then the credential verifier.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::envelope::Envelope;
use crate::gate::GateError;
use crate::lockout::AuthError;
use crate::policy::ClientType;
use crate::token::TokenError;

pub mod state;
pub mod types;
mod utils;

pub use state::GateState;
use types::{
    AuthErrorResponse, CaptchaResponse, CheckStatusResponse, LoginRequest, LoginResponse,
};
use utils::{extract_bearer_token, extract_client_ip};

// Counter key for public-surface requests arriving without a resolvable IP.
const UNKNOWN_IP: &str = "unknown";

#[utoipa::path(
    post,
    path = "/v1/h5/login",
    request_body = Envelope,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Bad envelope or captcha", body = AuthErrorResponse),
        (status = 401, description = "Rejected credentials or locked account", body = AuthErrorResponse)
    ),
    tag = "auth"
)]
pub async fn h5_login(
    state: Extension<Arc<GateState>>,
    headers: HeaderMap,
    Json(envelope): Json<Envelope>,
) -> Response {
    login(&state, &headers, ClientType::H5, &envelope)
}

#[utoipa::path(
    post,
    path = "/v1/admin/login",
    request_body = Envelope,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Bad envelope", body = AuthErrorResponse),
        (status = 401, description = "Rejected credentials or locked account", body = AuthErrorResponse)
    ),
    tag = "auth"
)]
pub async fn admin_login(
    state: Extension<Arc<GateState>>,
    headers: HeaderMap,
    Json(envelope): Json<Envelope>,
) -> Response {
    login(&state, &headers, ClientType::Admin, &envelope)
}

#[utoipa::path(
    post,
    path = "/v1/mobile/login",
    request_body = Envelope,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Bad envelope", body = AuthErrorResponse),
        (status = 401, description = "Rejected credentials or locked account", body = AuthErrorResponse)
    ),
    tag = "auth"
)]
pub async fn mobile_login(
    state: Extension<Arc<GateState>>,
    headers: HeaderMap,
    Json(envelope): Json<Envelope>,
) -> Response {
    login(&state, &headers, ClientType::Mobile, &envelope)
}

fn login(
    state: &GateState,
    headers: &HeaderMap,
    client: ClientType,
    envelope: &Envelope,
) -> Response {
    let now = Utc::now();

    let plaintext = match state.gate().open(envelope, client, now) {
        Ok(plaintext) => plaintext,
        Err(err) => return gate_error_response(&err),
    };

    let Ok(request) = serde_json::from_slice::<LoginRequest>(&plaintext) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            AuthErrorResponse::message("invalid login payload"),
        );
    };

    let is_public = client == ClientType::H5;
    let ip = extract_client_ip(headers).unwrap_or_else(|| UNKNOWN_IP.to_string());

    let principal = match state.engine().principals().find_by_username(&request.username) {
        Ok(principal) => principal,
        Err(err) => {
            error!("principal lookup failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Unknown accounts still count against the public-surface IP tracker and
    // share the generic credentials message.
    let Some(mut principal) = principal else {
        let need_captcha = is_public.then(|| state.captcha().on_failure(&ip));
        return error_response(
            StatusCode::UNAUTHORIZED,
            AuthErrorResponse {
                need_captcha,
                ..AuthErrorResponse::message("invalid username or password")
            },
        );
    };

    // Lock state is consulted before the password is looked at, so a locked
    // account never reveals whether a guess was correct.
    if let Err(err) = state.engine().ensure_unlocked(&mut principal, now) {
        return auth_error_response(&err, is_public.then(|| state.captcha().required(&ip)));
    }

    if is_public && state.captcha().required(&ip) {
        match request.captcha.as_deref() {
            None => {
                return auth_error_response(&AuthError::CaptchaRequired, Some(true));
            }
            Some(answer) if !state.captcha().verify(&ip, answer) => {
                return auth_error_response(&AuthError::CaptchaInvalid, Some(true));
            }
            Some(_) => {}
        }
    }

    if !state
        .verifier()
        .verify(&request.password, &principal.password_hash)
    {
        let err = state.engine().on_failure(&mut principal, now);
        let need_captcha = is_public.then(|| state.captcha().on_failure(&ip));
        return auth_error_response(&err, need_captcha);
    }

    state.engine().on_success(&mut principal, now);
    if is_public {
        state.captcha().on_success(&ip);
    }

    match state.gate().tokens().issue(
        &principal.username,
        &principal.role,
        request.device_id.as_deref(),
        now,
    ) {
        Ok(token) => {
            info!(username = %principal.username, client = client.as_str(), "login succeeded");
            (
                StatusCode::OK,
                Json(LoginResponse {
                    token,
                    expires_in: state.policy().token_ttl_seconds(),
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("failed to issue session token: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Token revoked (or nothing to revoke)")
    ),
    tag = "auth"
)]
pub async fn logout(state: Extension<Arc<GateState>>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = extract_bearer_token(&headers) {
        // A token that does not parse has nothing to revoke; logout still
        // succeeds.
        if let Err(err) = state.gate().tokens().revoke(&token, Utc::now()) {
            debug!("logout with unusable token: {err}");
        }
    }
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    get,
    path = "/v1/admin/check-status",
    responses(
        (status = 200, description = "Token validity and remaining lifetime", body = CheckStatusResponse)
    ),
    tag = "auth"
)]
pub async fn check_status(
    state: Extension<Arc<GateState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // Never throws: absent or invalid tokens report {valid: false, 0}.
    let now = Utc::now();
    let remaining = extract_bearer_token(&headers)
        .and_then(|token| state.gate().tokens().validate(&token, now).ok())
        .map(|claims| claims.remaining_seconds(now));

    Json(match remaining {
        Some(expires_in) => CheckStatusResponse {
            valid: true,
            expires_in,
        },
        None => CheckStatusResponse {
            valid: false,
            expires_in: 0,
        },
    })
}

#[utoipa::path(
    get,
    path = "/v1/h5/captcha",
    responses(
        (status = 200, description = "Fresh challenge for this client IP", body = CaptchaResponse)
    ),
    tag = "auth"
)]
pub async fn h5_captcha(state: Extension<Arc<GateState>>, headers: HeaderMap) -> Response {
    let ip = extract_client_ip(&headers).unwrap_or_else(|| UNKNOWN_IP.to_string());
    match state.captcha().issue_challenge(&ip) {
        Ok(captcha) => (StatusCode::OK, Json(CaptchaResponse { captcha })).into_response(),
        Err(err) => {
            error!("failed to issue captcha challenge: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn gate_error_response(err: &GateError) -> Response {
    let status = match err {
        GateError::Envelope(_) | GateError::Token(TokenError::Malformed) => {
            StatusCode::BAD_REQUEST
        }
        GateError::Token(_) => StatusCode::UNAUTHORIZED,
    };
    error_response(status, AuthErrorResponse::message(err.to_string()))
}

fn auth_error_response(err: &AuthError, need_captcha: Option<bool>) -> Response {
    let mut body = AuthErrorResponse {
        need_captcha,
        ..AuthErrorResponse::message(err.to_string())
    };
    let status = match err {
        AuthError::AccountLocked { unlock_at } => {
            body.unlock_at = *unlock_at;
            StatusCode::UNAUTHORIZED
        }
        AuthError::CredentialsInvalid { remaining_attempts } => {
            body.remaining_attempts = Some(*remaining_attempts);
            StatusCode::UNAUTHORIZED
        }
        AuthError::CaptchaRequired | AuthError::CaptchaInvalid => {
            body.need_captcha = Some(true);
            StatusCode::BAD_REQUEST
        }
    };
    error_response(status, body)
}

fn error_response(status: StatusCode, body: AuthErrorResponse) -> Response {
    (status, Json(body)).into_response()
}
