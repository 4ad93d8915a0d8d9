use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gcr_login::config::{self, SessionConfig};
use gcr_login::registry::StdoutSink;
use gcr_login::{LocalEnvironment, SessionManager, WrappedOutcome};

/// Deadline the CLI puts on the metadata request when none is configured
const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 10;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    session: SessionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct SessionArgs {
    /// Config file (defaults to ~/.config/gcr-login/config.toml if it exists)
    #[arg(long, global = true, env = "GCR_LOGIN_CONFIG")]
    config: Option<PathBuf>,
    /// Registry to log in to (e.g. https://gcr.io, https://eu.gcr.io)
    #[arg(long, global = true, env = "GCR_LOGIN_REGISTRY_URL")]
    registry_url: Option<String>,
    /// Metadata server token endpoint
    #[arg(long, global = true, env = "GCR_LOGIN_METADATA_ENDPOINT")]
    metadata_endpoint: Option<String>,
    /// Credential file to clean up on logout (defaults to $HOME/.dockercfg)
    #[arg(long, global = true, env = "GCR_LOGIN_CREDENTIAL_FILE")]
    credential_file: Option<PathBuf>,
    /// Container CLI to use (docker or podman)
    #[arg(long, global = true, env = "GCR_LOGIN_CONTAINER_CLI")]
    container_cli: Option<String>,
    /// Metadata request timeout in seconds (default 10)
    #[arg(long, global = true, env = "GCR_LOGIN_METADATA_TIMEOUT")]
    metadata_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in to the registry with a token from the metadata server
    Login,
    /// Remove the registry's entry from the credential store
    Logout,
    /// Log in, run a command, then log out again
    Run {
        /// Command to run while logged in
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

/// Build the session config: defaults, then config file, then flags/env vars
fn resolve_config(args: &SessionArgs) -> Result<SessionConfig> {
    let mut session_config = SessionConfig::default();

    let config_path = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|path| path.exists()),
    };
    if let Some(path) = config_path {
        let file = config::load_config_file(&path)?;
        session_config.apply_file(&file);
    }

    if let Some(url) = &args.registry_url {
        session_config.registry_url = url.clone();
    }
    if let Some(endpoint) = &args.metadata_endpoint {
        session_config.metadata_endpoint = endpoint.clone();
    }
    if let Some(path) = &args.credential_file {
        session_config.credential_file = Some(path.clone());
    }
    if let Some(cli) = &args.container_cli {
        session_config.container_cli = cli.clone();
    }
    if let Some(secs) = args.metadata_timeout {
        session_config.timeout = Some(Duration::from_secs(secs));
    }
    if session_config.timeout.is_none() {
        session_config.timeout = Some(Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS));
    }

    session_config
        .validate()
        .context("Invalid gcr-login configuration")?;
    debug!("Resolved session config: {:?}", session_config);

    Ok(session_config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("gcr-login").join("config.toml"))
}

async fn run_command(session: &mut SessionManager, command: &[String]) -> i32 {
    let Some((program, args)) = command.split_first() else {
        return 1;
    };

    let outcome = session
        .run_wrapped(|| async move {
            tokio::process::Command::new(program)
                .args(args)
                .status()
                .await
        })
        .await;

    match outcome {
        WrappedOutcome::LoginFailed => {
            eprintln!("Login failed, not running '{}'", program);
            1
        }
        WrappedOutcome::Completed { result, logged_out } => {
            if !logged_out {
                warn!("Logout after '{}' failed", program);
            }
            match result {
                Ok(status) => status.code().unwrap_or(1),
                Err(e) => {
                    eprintln!("Failed to execute '{}': {}", program, e);
                    1
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for all commands
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let session_config = resolve_config(&cli.session)?;
    let mut session = SessionManager::new(
        session_config,
        Arc::new(LocalEnvironment),
        Arc::new(StdoutSink),
    )
    .context("Failed to set up registry session")?;

    let code = match &cli.command {
        Commands::Login => i32::from(!session.login().await),
        Commands::Logout => i32::from(!session.logout().await),
        Commands::Run { command } => run_command(&mut session, command).await,
    };

    std::process::exit(code);
}
