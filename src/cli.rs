use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "carelink",
    version,
    about = "Command line client for the caregiver marketplace API"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "default",
        help = "Profile name to use"
    )]
    pub profile: String,
    #[arg(long, global = true, help = "Emit JSON output")]
    pub json: bool,
    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Verbose logging")]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Auth(AuthArgs),
    Request(RequestArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    Login(LoginArgs),
    Social(SocialArgs),
    Status,
    Refresh,
    Logout,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    #[arg(long, help = "Account email")]
    pub email: String,
    #[arg(long, help = "Account password (prompted when omitted)")]
    pub password: Option<String>,
}

#[derive(Debug, Args)]
pub struct SocialArgs {
    #[arg(long, help = "Identity provider, e.g. kakao, google, apple")]
    pub provider: String,
    #[arg(long = "token", help = "Access token issued by the provider")]
    pub access_token: String,
    #[arg(long, help = "Display name to register with")]
    pub name: Option<String>,
    #[arg(long, help = "Email to register with")]
    pub email: Option<String>,
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    #[arg(help = "HTTP method")]
    pub method: String,
    #[arg(help = "Path relative to the API base url, e.g. /jobs")]
    pub path: String,
    #[arg(long = "query", value_parser = parse_query_pair, action = ArgAction::Append, help = "Query parameter as key=value (repeatable)")]
    pub query: Vec<(String, String)>,
    #[arg(long, help = "JSON request body")]
    pub body: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Show,
    Set(ConfigSetArgs),
}

#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    #[arg(long, help = "API base url")]
    pub base_url: Option<String>,
    #[arg(long, help = "Request timeout in seconds")]
    pub timeout_secs: Option<u64>,
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.trim().is_empty() {
        return Err(format!("empty query key in `{raw}`"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}
