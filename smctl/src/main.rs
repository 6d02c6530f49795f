use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use smctl_tokens::config::FileConfigStore;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod service;

use cli::{Cli, Command};

fn default_config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".smctl").join("config.json"))
        .ok_or_else(|| eyre!("unable to determine the home directory; pass --config"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut store = FileConfigStore::new(path);
    let mut out = std::io::stdout().lock();

    match cli.command {
        Command::Login(args) => commands::login(args, &mut store, &mut out).await,
        Command::Logout => commands::logout(&mut store, &mut out).await,
        Command::Info => commands::info(&mut store, &mut out, &smctl_clock::System).await,
        Command::Curl(args) => commands::curl(args, &mut store, &mut out).await,
    }
}
