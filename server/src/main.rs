use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info, warn};
use server::logging;
use server::network::{Server, ServerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Remote vehicle simulation server")]
struct Args {
    /// TCP port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
    /// File that log records are appended to
    log_file: PathBuf,
    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Seconds between telemetry broadcasts
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    telemetry_interval: u64,
    /// Milliseconds between stop-flag checks in the broadcaster
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    shutdown_poll: u64,
}

/// Parses arguments, installs logging, and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = e.print();
            return code;
        }
    };

    if let Some(e) = logging::init(&args.log_file) {
        warn!(
            "- cannot open log file {}: {}; logging to stderr only",
            args.log_file.display(),
            e
        );
    }

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        telemetry_interval: Duration::from_secs(args.telemetry_interval),
        shutdown_poll: Duration::from_millis(args.shutdown_poll),
        ..ServerConfig::default()
    };

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("- received Ctrl+C, shutting down"),
            Err(e) => error!("- cannot listen for Ctrl+C: {}", e),
        }
        shutdown.trigger();
    });

    eprintln!("Server listening on {} (Ctrl+C to stop)", args.port);

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("- {}", e);
            ExitCode::FAILURE
        }
    }
}
