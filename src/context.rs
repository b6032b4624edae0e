use std::sync::Arc;

use crate::api::ApiClient;
use crate::auth::{FileSecureStorage, TokenStore};
use crate::config::{self, AppPaths, Settings};
use crate::error::AppResult;
use crate::output::Output;

#[derive(Debug)]
pub struct AppContext {
    pub profile: String,
    pub paths: AppPaths,
    pub settings: Settings,
    pub tokens: TokenStore,
    pub client: ApiClient,
    pub output: Output,
}

impl AppContext {
    pub fn bootstrap(profile: String, json: bool) -> AppResult<Self> {
        let profile = config::resolve_profile(&profile)?;
        let paths = AppPaths::discover()?;
        let settings = Settings::load(&paths, &profile)?;

        let storage = FileSecureStorage::new(paths.credentials_file(&profile));
        let tokens = TokenStore::new(Arc::new(storage));
        let login_hint = format!("session expired. run `carelink --profile {profile} auth login`");
        let client = ApiClient::new(settings.base_url()?, settings.timeout(), tokens.clone())?
            .with_session_expired_hook(move || eprintln!("{login_hint}"));

        Ok(Self {
            profile,
            paths,
            settings,
            tokens,
            client,
            output: Output::new(json),
        })
    }
}
