//! TURN balancer binary

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use turn_balancer::{BalancerServer, Config, setup_tracing};

#[derive(Parser)]
#[command(name = "turn-balancer")]
#[command(about = "Health and load aware TURN relay selection", version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long)]
    config_file: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Tracing needs the config, so errors before this point go to stderr
    let config = match Config::load(cli.config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.check_config {
        println!(
            "Configuration OK: {} endpoints, algorithm {}",
            config.turn.address_mapping.len(),
            config.load_balancer.algorithm
        );
        return ExitCode::SUCCESS;
    }

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(config.log_level())
        .to_string();

    let _telemetry_guard =
        match setup_tracing(&config.telemetry, &log_level, config.log_format()).await {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Failed to initialize tracing: {}", e);
                return ExitCode::FAILURE;
            }
        };

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let server = BalancerServer::new(config.to_server_config());
    match server.run(cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "TURN balancer failed");
            ExitCode::FAILURE
        }
    }
}

/// Cancel on SIGINT or SIGTERM
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unable to listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
