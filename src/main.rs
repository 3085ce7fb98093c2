use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ems::ipc::transport::remove_fifo;
use ems::ipc::{EmsClient, EmsClientConfig, Server};
use ems::script::{output_path, run_script_file};
use ems::shutdown::SignalWatcher;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging(level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ems")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("ems.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Server {
            endpoint,
            delay_us,
            workers,
        } => handle_server_command(endpoint, *delay_us, *workers, config),
        Commands::Client {
            request,
            response,
            server,
            script,
        } => handle_client_command(request, response, server, script, config),
    }
}

fn handle_server_command(endpoint: &Path, delay_us: Option<u64>, workers: Option<usize>, config: &Config) -> Result<()> {
    let mut server_config = config.server.to_server_config(endpoint, delay_us);
    if let Some(workers) = workers {
        server_config = server_config.with_workers(workers);
    }
    info!("Server config: {:?}", server_config);

    let watcher = SignalWatcher::install().context("Failed to install signal handlers")?;
    let server = Arc::new(Server::bind(server_config).context("Failed to start server")?);

    let stopper = Arc::clone(&server);
    watcher
        .spawn(Arc::clone(server.context()), move |reason| {
            println!("{} {:?}", "Shutting down:".yellow(), reason);
            if let Err(e) = stopper.shutdown() {
                error!("Shutdown failed: {}", e);
            }
        })
        .context("Failed to start signal watcher")?;

    println!("{} {}", "Server listening on".green(), endpoint.display());
    let result = server.run().context("Acceptor failed");

    // The signal thread may still hold a handle on the server; remove the
    // FIFO here rather than waiting for the last drop.
    remove_fifo(server.endpoint_path()).context("Failed to remove server FIFO")?;
    result?;

    println!("{}", "Server stopped".cyan());
    Ok(())
}

fn handle_client_command(request: &Path, response: &Path, server: &Path, script: &Path, config: &Config) -> Result<()> {
    // fail on a bad script path before creating any FIFO
    output_path(script)?;

    let client_config = EmsClientConfig::new(request, response, server).with_byte_order(config.client.byte_order);
    let mut client = EmsClient::connect(client_config).context("Failed to set up EMS")?;
    println!(
        "{} Session ID {} has been assigned.",
        "Setup completed successfully.".green(),
        client.session_id()
    );

    let (out_path, summary) = run_script_file(&mut client, script, config.client.max_reservation_size)
        .context(format!("Job script {} aborted", script.display()))?;
    client.quit().context("Failed to close session")?;

    info!("Job finished: {:?}", summary);
    println!(
        "{} {} requests ({} failed, {} invalid lines), output in {}",
        "Done:".green(),
        summary.requests,
        summary.failures,
        summary.invalid,
        out_path.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the configured level is known
    setup_logging(config.log_level.as_deref().unwrap_or("info")).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
