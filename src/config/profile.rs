use crate::error::{AppError, AppResult};

pub const DEFAULT_PROFILE: &str = "default";

/// Normalizes a requested profile name. Profiles name files on disk, so
/// anything outside `[A-Za-z0-9_-]` is rejected.
pub fn resolve_profile(requested: &str) -> AppResult<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_PROFILE.to_string());
    }

    let valid = trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid {
        return Err(AppError::InvalidInput(format!(
            "profile `{trimmed}` may only contain letters, digits, `-` and `_`"
        )));
    }

    Ok(trimmed.to_string())
}
