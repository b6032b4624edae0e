use std::sync::Arc;

use tracing::debug;

use crate::error::AppResult;

use super::clock::{Clock, SystemClock};
use super::jwt;
use super::storage::SecureStorage;
use super::token::{self, TokenRecord};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const EXPIRY_KEY: &str = "token_expiry_ms";

/// Token record persisted in [`SecureStorage`] with a derived expiry.
///
/// Read paths never fail: a storage error reads as a missing key, so a flaky
/// backend degrades to "not authenticated".
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn SecureStorage>,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn SecureStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Persists a freshly issued token.
    ///
    /// `refresh_token = None` keeps whatever refresh token is stored. The
    /// expiry comes from `expires_in_secs` when it is finite and positive,
    /// otherwise from the access token's `exp` claim; when neither is usable
    /// any previous expiry is removed.
    pub fn save(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: Option<f64>,
    ) -> AppResult<()> {
        self.storage.set(ACCESS_TOKEN_KEY, access_token)?;
        if let Some(refresh_token) = refresh_token {
            self.storage.set(REFRESH_TOKEN_KEY, refresh_token)?;
        }

        match self.derive_expiry(access_token, expires_in_secs) {
            Some(expiry) => self.storage.set(EXPIRY_KEY, &expiry.to_string())?,
            None => {
                debug!("no expiry available for saved access token");
                self.storage.delete(EXPIRY_KEY)?;
            }
        }

        Ok(())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    pub fn is_expired(&self) -> bool {
        token::is_stale(self.expiry_ms(), self.clock.now_millis())
    }

    pub fn record(&self) -> Option<TokenRecord> {
        let access_token = self.access_token()?;
        Some(TokenRecord {
            expiry_timestamp_ms: self.expiry_ms(),
            refresh_token: self.refresh_token(),
            access_token,
        })
    }

    /// Removes every key, attempting all three deletes even if one fails.
    pub fn clear(&self) -> AppResult<()> {
        let mut first_error = None;
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRY_KEY] {
            if let Err(err) = self.storage.delete(key) {
                debug!(key, error = %err, "failed to delete credential");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Stored expiry, or the access token's `exp` claim cached on first use.
    fn expiry_ms(&self) -> Option<i64> {
        if let Some(stored) = self.read(EXPIRY_KEY) {
            match stored.trim().parse::<i64>() {
                Ok(expiry) => return Some(expiry),
                Err(err) => debug!(value = %stored, error = %err, "ignoring unparsable expiry"),
            }
        }

        let expiry = jwt::expiry_millis(&self.access_token()?)?;
        if let Err(err) = self.storage.set(EXPIRY_KEY, &expiry.to_string()) {
            debug!(error = %err, "failed to cache derived token expiry");
        }
        Some(expiry)
    }

    fn derive_expiry(&self, access_token: &str, expires_in_secs: Option<f64>) -> Option<i64> {
        let from_server = expires_in_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| {
                self.clock
                    .now_millis()
                    .saturating_add((secs * 1000.0) as i64)
            });

        from_server.or_else(|| jwt::expiry_millis(access_token))
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(err) => {
                debug!(key, error = %err, "secure storage read failed, treating as absent");
                None
            }
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}
