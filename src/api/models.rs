use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PasswordLoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLoginRequest {
    pub provider: String,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<f64>,
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Credentials issued by any token-minting endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionGrant {
    pub tokens: TokenGrant,
    pub user: Option<UserProfile>,
}

/// Decodes the bare `{ accessToken, refreshToken?, expiresIn? }` body of the
/// refresh endpoint.
pub fn decode_refresh(body: &[u8]) -> AppResult<TokenGrant> {
    let payload: RefreshResponse = decode(body, "refresh")?;
    Ok(TokenGrant {
        access_token: non_empty_token(payload.access_token, "refresh")?,
        refresh_token: payload.refresh_token.filter(|token| !token.is_empty()),
        expires_in: payload.expires_in,
    })
}

/// Decodes the `{ data: { access_token, refresh_token?, user } }` envelope
/// returned by both login endpoints.
pub fn decode_session(body: &[u8]) -> AppResult<SessionGrant> {
    let envelope: Envelope<SessionPayload> = decode(body, "login")?;
    let payload = envelope.data;
    Ok(SessionGrant {
        tokens: TokenGrant {
            access_token: non_empty_token(payload.access_token, "login")?,
            refresh_token: payload.refresh_token.filter(|token| !token.is_empty()),
            expires_in: payload.expires_in,
        },
        user: payload.user,
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Human readable message from a backend error body such as
/// `{ "statusCode": 400, "message": ["email must be an email"], "error": "Bad Request" }`.
pub fn error_message(body: &str) -> Option<String> {
    let payload = serde_json::from_str::<ApiErrorBody>(body).ok()?;
    let message = payload.message.as_ref().and_then(message_text);

    match (message, payload.error) {
        (Some(message), Some(error)) if message != error => Some(format!("{error}: {message}")),
        (Some(message), _) => Some(message),
        (None, Some(error)) => Some(error),
        (None, None) => None,
    }
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Array(items) => {
            let parts = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}

fn decode<T: DeserializeOwned>(body: &[u8], endpoint: &str) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|err| {
        AppError::Auth(format!("unexpected {endpoint} response shape: {err}"))
    })
}

fn non_empty_token(token: String, endpoint: &str) -> AppResult<String> {
    if token.trim().is_empty() {
        return Err(AppError::Auth(format!(
            "{endpoint} response carried an empty access token"
        )));
    }
    Ok(token)
}
