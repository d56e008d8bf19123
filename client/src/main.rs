use clap::Parser;
use client::network::{run_session, Backoff, ClientOptions};
use log::info;
use std::process::ExitCode;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(default_value = "127.0.0.1:9000")]
    server: String,

    /// Display name sent with HELLO
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// User for AUTH (requires --password)
    #[arg(short = 'u', long, requires = "password")]
    user: Option<String>,

    /// Password for AUTH
    #[arg(short = 'p', long, requires = "user")]
    password: Option<String>,

    /// Print telemetry as JSON
    #[arg(long)]
    json: bool,

    /// Reconnect after the connection drops (2s, 4s, ... up to 30s)
    #[arg(short = 'r', long)]
    reconnect: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    let options = ClientOptions {
        name: args.name,
        credentials: args.user.zip(args.password),
        json: args.json,
    };

    info!("Connecting to: {}", args.server);
    let reconnect = args.reconnect.then(Backoff::default);
    let stdin = BufReader::new(tokio::io::stdin());
    let result = run_session(
        &args.server,
        &options,
        stdin,
        &mut std::io::stdout(),
        reconnect,
    )
    .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("connection to {} failed: {}", args.server, e);
            ExitCode::FAILURE
        }
    }
}
