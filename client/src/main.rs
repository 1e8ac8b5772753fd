use clap::Parser;
use client::game::{describe_state, find_own_player};
use client::input::Command;
use client::network::Client;
use log::{error, info, warn};
use shared::DEFAULT_PORT;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short, long, default_value = "localhost")]
    server: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Display name; prompted for when omitted
    #[arg(short, long)]
    name: Option<String>,

    /// Input sampling tick in milliseconds
    #[arg(short, long, default_value = "16")]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let name = match args.name {
        Some(name) => name,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(b"Enter your name: ").await?;
            stdout.flush().await?;
            lines.next_line().await?.unwrap_or_default().trim().to_string()
        }
    };

    let address = format!("{}:{}", args.server, args.port);
    let (mut client, mut session) = Client::connect(&address, &name).await?;
    let mut state_rx = client.subscribe();

    info!("Controls: w/a/s/d to move, 'face <dir>', 'name <name>', 'quit'");

    let mut input_tick = interval(Duration::from_millis(args.tick_ms.max(1)));
    let mut cache_open = true;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match Command::parse(&line) {
                    Some(command) => {
                        if !client.input_mut().handle(command) {
                            break;
                        }
                    }
                    None => warn!("Unknown command: {}", line.trim()),
                }
            },

            _ = input_tick.tick() => {
                client.flush_input().await?;
            },

            changed = state_rx.changed(), if cache_open => {
                // Sender gone means the session is ending; the branch below reports it
                if changed.is_err() {
                    cache_open = false;
                    continue;
                }
                let world = state_rx.borrow_and_update().clone();
                print!("{}", describe_state(&world));
                if let Some(me) = find_own_player(&world, client.local_id()) {
                    println!("You are {} at ({}, {})", me.name, me.coords.x, me.coords.y);
                }
            },

            end = session.finished() => {
                match end {
                    Ok(reason) => info!("Session ended: {:?}", reason),
                    Err(e) => error!("Receive failed: {}", e),
                }
                println!("Server disconnected");
                std::process::exit(1);
            },
        }
    }

    session.abort();
    client.close().await?;

    Ok(())
}
