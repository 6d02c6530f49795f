use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use smctl_tokens::{ClientId, ClientSecret, Password, Username};
use url::Url;

/// Command line client for the service manager
#[derive(Debug, Parser)]
#[command(name = "smctl", version, about)]
pub struct Cli {
    /// The client configuration file [default: ~/.smctl/config.json]
    #[arg(long, env = "SMCTL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in to a service manager
    Login(LoginArgs),
    /// Forget the held token
    Logout,
    /// Show the current target and login status
    Info,
    /// Send an authenticated request to the service manager
    Curl(CurlArgs),
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// The service manager base URL
    #[arg(short = 'a', long, env = "SMCTL_URL")]
    pub url: Url,

    /// The user to log in as; prompted for if omitted
    #[arg(short, long, env = "SMCTL_USER")]
    pub user: Option<Username>,

    /// The user's password; prompted for if omitted
    #[arg(short, long, env = "SMCTL_PASSWORD", hide_env_values = true)]
    pub password: Option<Password>,

    /// The client ID presented to the identity provider
    #[arg(long, env = "SMCTL_CLIENT_ID", default_value = "smctl")]
    pub client_id: ClientId,

    /// The client secret; selects the client credentials grant
    #[arg(long, env = "SMCTL_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<ClientSecret>,

    /// The identity provider issuer, skipping the lookup on the service manager
    #[arg(long, env = "SMCTL_ISSUER_URL")]
    pub issuer_url: Option<Url>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub skip_ssl_validation: bool,

    /// Timeout in seconds for each outbound HTTP call
    #[arg(long, env = "SMCTL_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Debug, Args)]
pub struct CurlArgs {
    /// The request path, relative to the service manager base URL
    pub path: String,

    /// The HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: reqwest::Method,

    /// A JSON request body
    #[arg(short, long)]
    pub data: Option<String>,
}
