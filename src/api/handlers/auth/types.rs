//! Request/response types for the auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Plaintext carried inside the login envelope.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
}

/// Error body shared by the auth endpoints. `need_captcha` is a typed flag,
/// never encoded into the message string.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct AuthErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_captcha: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_at: Option<DateTime<Utc>>,
}

impl AuthErrorResponse {
    #[must_use]
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CheckStatusResponse {
    pub valid: bool,
    pub expires_in: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CaptchaResponse {
    pub captcha: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_optional_fields_default() {
        let request: LoginRequest =
            serde_json::from_str(r#"{"username":"alice","password":"pw"}"#).unwrap();
        assert_eq!(request.username, "alice");
        assert_eq!(request.device_id, None);
        assert_eq!(request.captcha, None);
    }

    #[test]
    fn error_response_omits_empty_fields() {
        let body = serde_json::to_value(AuthErrorResponse::message("nope")).unwrap();
        assert_eq!(body, serde_json::json!({"error": "nope"}));
    }

    #[test]
    fn error_response_carries_the_captcha_flag() {
        let response = AuthErrorResponse {
            need_captcha: Some(true),
            ..AuthErrorResponse::message("captcha required")
        };
        let body = serde_json::to_value(response).unwrap();
        assert_eq!(body["need_captcha"], serde_json::json!(true));
    }
}
