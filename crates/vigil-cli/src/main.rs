// crates/vigil-cli/src/main.rs
// ============================================================================
// Module: Vigil Daemon Entrypoint
// Description: The `vigild` binary: serve, migrate, inspect, check.
// Purpose: Boot the control plane from environment configuration.
// Dependencies: clap, tokio, tracing-subscriber, vigil-server
// ============================================================================

//! ## Overview
//! `vigild serve` boots the full control plane; `migrate` applies schema
//! migrations and exits; `license-inspect` verifies a license file offline;
//! `config-check` validates the environment without touching backends.
//! Logging initializes once here with an env-filtered subscriber.

// ============================================================================
// SECTION: Imports
// ============================================================================

use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use time::OffsetDateTime;

use vigil_config::AppConfig;
use vigil_core::evaluate_state;
use vigil_crypto::parse_and_verify;
use vigil_store::PostgresStore;
use vigil_store::PostgresStoreConfig;

// ============================================================================
// SECTION: CLI Shape
// ============================================================================

/// The Vigil control-plane daemon.
#[derive(Debug, Parser)]
#[command(name = "vigild", version, about = "Vigil VMS control plane")]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    json_logs: bool,
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Daemon subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Run the control plane until interrupted.
    Serve,
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Verify a license file offline and print its state.
    LicenseInspect {
        /// License file path.
        #[arg(long)]
        path: std::path::PathBuf,
        /// PEM public key file path.
        #[arg(long)]
        pubkey: std::path::PathBuf,
    },
    /// Validate the environment configuration and exit.
    ConfigCheck,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Top-level CLI failures.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration failed to load or validate.
    #[error("config: {0}")]
    Config(#[from] vigil_config::ConfigError),
    /// The server failed to boot or serve.
    #[error("server: {0}")]
    Server(#[from] vigil_server::ServerError),
    /// Store bootstrap failed.
    #[error("store: {0}")]
    Store(String),
    /// License inspection failed to read its inputs.
    #[error("license: {0}")]
    License(String),
}

// ============================================================================
// SECTION: Entrypoint
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    match cli.command {
        Command::Serve => {
            let config = AppConfig::from_env()?;
            tracing::info!(?config, "configuration loaded");
            vigil_server::run(config).await?;
            Ok(())
        }
        Command::Migrate => {
            let config = AppConfig::from_env()?;
            let store_config = PostgresStoreConfig {
                connection: config.db.connection_string(),
                ..PostgresStoreConfig::default()
            };
            tokio::task::spawn_blocking(move || PostgresStore::connect(&store_config))
                .await
                .map_err(|err| CliError::Store(err.to_string()))?
                .map_err(|err| CliError::Store(err.to_string()))?;
            tracing::info!("migrations applied");
            Ok(())
        }
        Command::LicenseInspect {
            path,
            pubkey,
        } => {
            let bytes =
                std::fs::read(&path).map_err(|err| CliError::License(err.to_string()))?;
            let pem = std::fs::read_to_string(&pubkey)
                .map_err(|err| CliError::License(err.to_string()))?;
            match parse_and_verify(&bytes, &pem) {
                Ok(payload) => {
                    let state = evaluate_state(&payload, OffsetDateTime::now_utc());
                    tracing::info!(
                        license_id = %payload.license_id,
                        customer = %payload.customer_name,
                        state = state.as_str(),
                        max_cameras = payload.limits.max_cameras,
                        max_nvrs = payload.limits.max_nvrs,
                        "license verified"
                    );
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(error = %err, "license verification failed");
                    Err(CliError::License(err.to_string()))
                }
            }
        }
        Command::ConfigCheck => {
            let config = AppConfig::from_env()?;
            tracing::info!(?config, "configuration valid");
            Ok(())
        }
    }
}

/// Initializes the global tracing subscriber.
fn init_tracing(json_logs: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
