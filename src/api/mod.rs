pub mod client;
pub mod endpoints;
pub mod models;
pub mod refresh;

pub use client::{ApiClient, ApiRequest, SessionExpiredHook};
pub use refresh::RefreshState;
