use serde::Serialize;

use crate::cli::{ConfigCommand, ConfigSetArgs};
use crate::config::Settings;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
struct ConfigView {
    profile: String,
    base_url: String,
    timeout_secs: u64,
    settings_file: String,
    credentials_file: String,
}

pub async fn run(ctx: &AppContext, command: ConfigCommand) -> AppResult<()> {
    match command {
        ConfigCommand::Show => show(ctx, &ctx.settings),
        ConfigCommand::Set(args) => {
            let settings = apply(ctx.settings.clone(), args)?;
            settings.save(&ctx.paths, &ctx.profile)?;
            show(ctx, &settings)
        }
    }
}

fn show(ctx: &AppContext, settings: &Settings) -> AppResult<()> {
    let view = ConfigView {
        profile: ctx.profile.clone(),
        base_url: settings.base_url()?.to_string(),
        timeout_secs: settings.timeout().as_secs(),
        settings_file: ctx.paths.settings_file(&ctx.profile).display().to_string(),
        credentials_file: ctx
            .paths
            .credentials_file(&ctx.profile)
            .display()
            .to_string(),
    };

    let text = format!(
        "{}: {} (timeout {}s)\nsettings: {}\ncredentials: {}",
        view.profile, view.base_url, view.timeout_secs, view.settings_file, view.credentials_file
    );
    ctx.output.emit(&text, &view)
}

fn apply(mut settings: Settings, args: ConfigSetArgs) -> AppResult<Settings> {
    if args.base_url.is_none() && args.timeout_secs.is_none() {
        return Err(AppError::InvalidInput(
            "nothing to set; pass --base-url and/or --timeout-secs".to_string(),
        ));
    }

    if let Some(base_url) = args.base_url {
        settings.base_url = Some(base_url.trim().to_string());
        settings.base_url()?;
    }

    if let Some(timeout_secs) = args.timeout_secs {
        if timeout_secs == 0 {
            return Err(AppError::InvalidInput(
                "--timeout-secs must be greater than 0".to_string(),
            ));
        }
        settings.timeout_secs = Some(timeout_secs);
    }

    Ok(settings)
}
