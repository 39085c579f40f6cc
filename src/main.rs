//! drive_ops CLI - Create, list, update and delete Google Drive files.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use drive_ops::operations::{self, Action, FileArgs};
use drive_ops::{CredentialCache, DriveClient, InstalledFlow, DRIVE_SCOPE};

/// CLI tool for basic Google Drive file operations.
#[derive(Parser)]
#[command(name = "drive_ops")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Action to perform.
    #[arg(value_enum)]
    action: Action,

    #[command(flatten)]
    file: FileArgs,

    /// OAuth2 client secret JSON downloaded from the Google Cloud console.
    #[arg(long, env = "DRIVE_CLIENT_SECRET", default_value = "credentials.json")]
    client_secret: PathBuf,

    /// File the authorized credential is cached in.
    #[arg(long, env = "DRIVE_TOKEN_CACHE", default_value = "token.json")]
    token_cache: PathBuf,

    /// Authorization scope to request (repeatable). A scope not yet granted
    /// triggers a new consent that also keeps the scopes granted before.
    #[arg(long = "scope", default_value = DRIVE_SCOPE)]
    scopes: Vec<String>,

    /// Maximum number of files shown by `list`.
    #[arg(long, default_value_t = 10)]
    page_size: u32,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // RUST_LOG controls the level (e.g. RUST_LOG=drive_ops=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn failure_context(action: Action) -> String {
    format!("Failed to {action} file")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let flow = InstalledFlow::new(&cli.client_secret);
    let cache = CredentialCache::new(&cli.token_cache, flow);
    debug!(action = ?cli.action, token_cache = ?cache.path(), "starting");

    let client = DriveClient::new(cache, cli.scopes);

    let mut stdout = io::stdout().lock();
    operations::run(cli.action, &cli.file, cli.page_size, &client, &mut stdout)
        .await
        .with_context(|| failure_context(cli.action))?;

    Ok(())
}
