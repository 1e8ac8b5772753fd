use clap::Parser;
use log::info;
use server::network::Server;
use shared::{BROADCAST_INTERVAL_MS, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// How often the world is checked for changes and rebroadcast
    #[arg(short, long, default_value_t = BROADCAST_INTERVAL_MS)]
    broadcast_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let server = Server::new(
        &address,
        Duration::from_millis(args.broadcast_interval_ms.max(1)),
    )
    .await?;
    let shutdown = server.shutdown_handle();

    let server_handle = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully...");
    shutdown.shutdown();

    server_handle.await??;

    Ok(())
}
