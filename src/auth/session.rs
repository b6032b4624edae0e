use serde::Serialize;
use tracing::info;

use crate::api::ApiClient;
use crate::api::endpoints;
use crate::api::models::{self, PasswordLoginRequest, SessionGrant, SocialLoginRequest, UserProfile};
use crate::error::{AppError, AppResult};

use super::jwt;
use super::token_store::TokenStore;

#[derive(Debug, Serialize)]
pub struct AuthLoginResult {
    pub profile: String,
    pub method: String,
    pub user: Option<UserProfile>,
    pub expires_in_seconds: Option<i64>,
    pub has_refresh_token: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub profile: String,
    pub logged_in: bool,
    pub subject: Option<String>,
    pub expired: Option<bool>,
    pub expires_in_seconds: Option<i64>,
    pub has_refresh_token: Option<bool>,
    pub note: Option<String>,
}

impl AuthStatus {
    fn logged_out(profile: &str, note: &str) -> Self {
        Self {
            profile: profile.to_string(),
            logged_in: false,
            subject: None,
            expired: None,
            expires_in_seconds: None,
            has_refresh_token: None,
            note: Some(note.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SocialLogin {
    pub provider: String,
    pub access_token: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default)]
pub struct AuthService;

impl AuthService {
    pub async fn login(
        profile: &str,
        client: &ApiClient,
        email: &str,
        password: &str,
    ) -> AppResult<AuthLoginResult> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::InvalidInput(
                "email and password are required".to_string(),
            ));
        }

        let body = client
            .post_unauthenticated(
                endpoints::login_endpoint(),
                &PasswordLoginRequest { email, password },
            )
            .await?;
        let grant = models::decode_session(&body)?;
        Self::establish(profile, client.tokens(), grant, "password".to_string())
    }

    pub async fn social_login(
        profile: &str,
        client: &ApiClient,
        login: SocialLogin,
    ) -> AppResult<AuthLoginResult> {
        let provider = login.provider.trim().to_ascii_lowercase();
        if provider.is_empty() {
            return Err(AppError::InvalidInput("provider is required".to_string()));
        }
        if login.access_token.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "provider access token is required".to_string(),
            ));
        }

        let request = SocialLoginRequest {
            provider: provider.clone(),
            access_token: login.access_token,
            name: login.name.filter(|name| !name.trim().is_empty()),
            email: login.email.filter(|email| !email.trim().is_empty()),
        };
        let body = client
            .post_unauthenticated(endpoints::social_login_endpoint(), &request)
            .await?;
        let grant = models::decode_session(&body)?;
        Self::establish(profile, client.tokens(), grant, format!("social:{provider}"))
    }

    pub async fn refresh(profile: &str, client: &ApiClient) -> AppResult<AuthStatus> {
        if client.tokens().access_token().is_none() {
            return Err(AppError::InvalidInput(
                "not logged in. run `carelink auth login`".to_string(),
            ));
        }

        client.refresh_now().await?;
        let mut status = Self::status(profile, client.tokens());
        status.note = Some("access token refreshed".to_string());
        Ok(status)
    }

    pub fn status(profile: &str, tokens: &TokenStore) -> AuthStatus {
        let Some(record) = tokens.record() else {
            return AuthStatus::logged_out(profile, "no credentials stored");
        };

        let now = tokens.now_millis();
        AuthStatus {
            profile: profile.to_string(),
            logged_in: true,
            subject: jwt::decode_claims(&record.access_token).and_then(|claims| claims.sub),
            expired: Some(record.is_expired_at(now)),
            expires_in_seconds: record.expires_in_seconds(now),
            has_refresh_token: Some(record.has_refresh_token()),
            note: record
                .expiry_timestamp_ms
                .is_none()
                .then(|| "token expiry unknown; treated as fresh".to_string()),
        }
    }

    pub fn logout(profile: &str, tokens: &TokenStore) -> AppResult<AuthStatus> {
        tokens.clear()?;
        info!(profile, "local credentials removed");
        Ok(AuthStatus::logged_out(profile, "local credentials removed"))
    }

    fn establish(
        profile: &str,
        tokens: &TokenStore,
        grant: SessionGrant,
        method: String,
    ) -> AppResult<AuthLoginResult> {
        let SessionGrant { tokens: issued, user } = grant;
        // A new session never inherits the previous account's refresh token.
        tokens.clear()?;
        tokens.save(
            &issued.access_token,
            issued.refresh_token.as_deref(),
            issued.expires_in,
        )?;
        info!(profile, method = %method, "session established");

        let expires_in_seconds = tokens
            .record()
            .and_then(|record| record.expires_in_seconds(tokens.now_millis()));

        Ok(AuthLoginResult {
            profile: profile.to_string(),
            method,
            user,
            expires_in_seconds,
            has_refresh_token: tokens.refresh_token().is_some(),
        })
    }
}
