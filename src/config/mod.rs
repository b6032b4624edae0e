pub mod paths;
pub mod profile;
pub mod settings;

pub use paths::AppPaths;
pub use profile::{DEFAULT_PROFILE, resolve_profile};
pub use settings::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, Settings};
