use serde::Serialize;

/// Safety margin before the recorded expiry at which a token counts as stale.
/// Shared by the pre-send check and the status report.
pub const EXPIRY_BUFFER_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry_timestamp_ms: Option<i64>,
}

impl TokenRecord {
    /// An unknown expiry never counts as stale.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        is_stale(self.expiry_timestamp_ms, now_ms)
    }

    pub fn expires_in_seconds(&self, now_ms: i64) -> Option<i64> {
        let expiry = self.expiry_timestamp_ms?;
        Some(expiry.saturating_sub(now_ms) / 1000)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }
}

pub(crate) fn is_stale(expiry_ms: Option<i64>, now_ms: i64) -> bool {
    match expiry_ms {
        Some(expiry) => now_ms >= expiry.saturating_sub(EXPIRY_BUFFER_MS),
        None => false,
    }
}
