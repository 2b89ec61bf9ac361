use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use tokio::signal::unix::{SignalKind, signal};

use drainr::daemon::Daemon;
use drainr::ipc::{DaemonResponse, IpcClient};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging(config: &Config, verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drainr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("drainr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let level = if verbose {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let socket = cli.socket.as_ref();
    match &cli.command {
        Commands::Serve { drain_timeout_ms } => handle_serve_command(socket, *drain_timeout_ms, config).await,
        Commands::Call { method, params } => handle_call_command(method, params.as_deref(), socket, config).await,
        Commands::Ping => handle_ping_command(socket, config).await,
        Commands::Status => handle_status_command(socket, config).await,
    }
}

/// Resolves on the first SIGINT or SIGTERM
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    })
}

async fn handle_serve_command(socket: Option<&PathBuf>, drain_timeout_ms: Option<u64>, config: &Config) -> Result<()> {
    let options = config.serve_options(socket, drain_timeout_ms);
    info!("Serving with options: {:?}", options);
    println!(
        "{} {} (drain timeout {}ms)",
        "Serving on".green(),
        options.server.socket_path.display(),
        options.drain_timeout.as_millis()
    );

    let daemon = Daemon::new(options);
    let signal = shutdown_signal()?;

    match daemon.run_until(signal).await {
        Ok(()) => {
            println!("{}", "Drained cleanly".green());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Shutdown failed:".red(), e);
            Err(e).context("Daemon did not shut down cleanly")
        }
    }
}

async fn connect(socket: Option<&PathBuf>, config: &Config) -> Result<IpcClient> {
    let client = IpcClient::new(config.client_config(socket));
    client
        .connect()
        .await
        .context(format!("Failed to connect to daemon at {}", client.socket_path().display()))?;
    Ok(client)
}

fn print_response(response: DaemonResponse) -> Result<()> {
    match response.into_result() {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(error) => {
            eprintln!("{} {}", "Error:".red(), error);
            Err(error).context("Daemon returned an error")
        }
    }
}

async fn handle_call_command(
    method: &str,
    params: Option<&str>,
    socket: Option<&PathBuf>,
    config: &Config,
) -> Result<()> {
    let params = match params {
        Some(raw) => serde_json::from_str(raw).context("Params must be valid JSON")?,
        None => serde_json::Value::Null,
    };

    let client = connect(socket, config).await?;
    info!("Calling '{}'", method);
    let response = client.request(method, params).await?;
    client.disconnect().await?;
    print_response(response)
}

async fn handle_ping_command(socket: Option<&PathBuf>, config: &Config) -> Result<()> {
    let client = connect(socket, config).await?;
    let response = client.request_no_params(drainr::ipc::Methods::PING).await?;
    client.disconnect().await?;

    if response.is_success() {
        println!("{}", "pong".green());
        Ok(())
    } else if response.is_unavailable() {
        println!("{}", "Daemon is shutting down".yellow());
        Ok(())
    } else {
        print_response(response)
    }
}

async fn handle_status_command(socket: Option<&PathBuf>, config: &Config) -> Result<()> {
    let client = connect(socket, config).await?;
    let response = client.status().await?;
    client.disconnect().await?;

    if !response.is_success() {
        return print_response(response);
    }
    let result = response.result.unwrap_or_default();

    let active = result["active"].as_u64().unwrap_or(0);
    let draining = result["shutdown_requested"].as_bool().unwrap_or(false);
    println!("{} {}", "In flight:".cyan(), active);
    if draining {
        println!("{} {}", "State:".cyan(), "draining".yellow());
    } else {
        println!("{} {}", "State:".cyan(), "serving".green());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging at the configured level
    setup_logging(&config, cli.is_verbose()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
