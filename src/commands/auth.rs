use std::io::{self, IsTerminal, Write};

use crate::auth::{AuthService, AuthStatus, SocialLogin};
use crate::cli::{AuthCommand, LoginArgs, SocialArgs};
use crate::context::AppContext;
use crate::error::{AppError, AppResult};

pub async fn run(ctx: &AppContext, command: AuthCommand) -> AppResult<()> {
    match command {
        AuthCommand::Login(args) => login(ctx, args).await,
        AuthCommand::Social(args) => social(ctx, args).await,
        AuthCommand::Status => {
            let status = AuthService::status(&ctx.profile, &ctx.tokens);
            ctx.output.emit(&describe_status(&status), &status)
        }
        AuthCommand::Refresh => {
            let status = AuthService::refresh(&ctx.profile, &ctx.client).await?;
            ctx.output.emit(&describe_status(&status), &status)
        }
        AuthCommand::Logout => {
            let status = AuthService::logout(&ctx.profile, &ctx.tokens)?;
            let text = format!("{}: logged out", status.profile);
            ctx.output.emit(&text, &status)
        }
    }
}

async fn login(ctx: &AppContext, args: LoginArgs) -> AppResult<()> {
    let password = match args.password {
        Some(password) => password,
        None => prompt_password()?,
    };

    let result = AuthService::login(&ctx.profile, &ctx.client, &args.email, &password).await?;
    let who = result
        .user
        .as_ref()
        .and_then(|user| user.name.clone().or_else(|| user.email.clone()))
        .unwrap_or(args.email);
    let text = format!("{}: logged in as {who}", result.profile);
    ctx.output.emit(&text, &result)
}

async fn social(ctx: &AppContext, args: SocialArgs) -> AppResult<()> {
    let login = SocialLogin {
        provider: args.provider,
        access_token: args.access_token,
        name: args.name,
        email: args.email,
    };

    let result = AuthService::social_login(&ctx.profile, &ctx.client, login).await?;
    let who = result
        .user
        .as_ref()
        .and_then(|user| user.name.clone().or_else(|| user.email.clone()))
        .unwrap_or_else(|| "caregiver".to_string());
    let text = format!("{}: logged in as {who} via {}", result.profile, result.method);
    ctx.output.emit(&text, &result)
}

fn describe_status(status: &AuthStatus) -> String {
    if !status.logged_in {
        return format!("{}: logged out", status.profile);
    }

    let subject = status
        .subject
        .as_ref()
        .map(|subject| format!(" as {subject}"))
        .unwrap_or_default();
    let expiry = match (status.expired, status.expires_in_seconds) {
        (Some(true), _) => " (access token stale)".to_string(),
        (_, Some(secs)) => format!(" (expires in {secs}s)"),
        _ => " (expiry unknown)".to_string(),
    };
    let refresh_hint = match status.has_refresh_token {
        Some(true) => ", refresh available",
        Some(false) => ", no refresh token",
        None => "",
    };

    format!("{}: logged in{subject}{expiry}{refresh_hint}", status.profile)
}

fn prompt_password() -> AppResult<String> {
    if !io::stdin().is_terminal() {
        return Err(AppError::InvalidInput(
            "--password is required when stdin is not a terminal".to_string(),
        ));
    }

    loop {
        let mut stdout = io::stdout();
        write!(stdout, "Password: ")?;
        stdout.flush()?;

        let mut value = String::new();
        io::stdin().read_line(&mut value)?;
        let value = value.trim_end_matches(['\r', '\n']).to_string();
        if !value.is_empty() {
            return Ok(value);
        }
        eprintln!("value is required");
    }
}
