//! Wire-level probe: joins, walks a small square and prints every snapshot.
//! Talks the raw record format so it can check a server without the client crate.

use clap::Parser;
use shared::codec::{FrameReader, FrameWriter};
use shared::{ClientMessage, InputDelta, ServerMessage, DEFAULT_PORT};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;

#[derive(Parser, Debug)]
struct Args {
    /// Server address
    #[arg(short, long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Display name to register
    #[arg(short, long, default_value = "probe")]
    name: String,

    /// Delay between moves in milliseconds
    #[arg(short, long, default_value = "200")]
    delay_ms: u64,
}

fn update(key: &str, value: &str) -> ClientMessage {
    ClientMessage::update(InputDelta::from([(key.to_string(), value.to_string())]))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {} as {}", args.server, stream.local_addr()?);

    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    let printer = tokio::spawn(async move {
        loop {
            match reader.read_frame::<ServerMessage>().await {
                Ok(Some(message)) if message.is_terminal() => {
                    println!("Server ended the session");
                    break;
                }
                Ok(Some(message)) => {
                    let players = message.state.unwrap_or_default();
                    println!("Snapshot with {} players", players.len());
                    for (id, player) in &players {
                        println!(
                            "  {} {:?} at ({}, {})",
                            id, player.name, player.coords.x, player.coords.y
                        );
                    }
                }
                Ok(None) => {
                    println!("Stream closed");
                    break;
                }
                Err(e) => {
                    println!("Decode error: {}", e);
                    break;
                }
            }
        }
    });

    writer.write_frame(&update("name", &args.name)).await?;

    for direction in ["right", "down", "left", "up"] {
        sleep(Duration::from_millis(args.delay_ms)).await;
        println!("Moving {}", direction);
        writer.write_frame(&update("movement", direction)).await?;
    }

    sleep(Duration::from_millis(args.delay_ms)).await;
    writer.shutdown().await?;
    let _ = printer.await;

    Ok(())
}
