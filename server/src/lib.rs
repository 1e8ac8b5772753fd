//! # Grid World Server Library
//!
//! Authoritative server for the shared grid world. It owns the single copy of
//! world truth, ingests per-participant input records, and republishes the
//! full world to every connected participant whenever it changes.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Main Loop
//! The world map, its dirty flag and the connection registry all belong to
//! one task. Connection tasks never touch them directly; they send events over
//! an `mpsc` channel and the main loop applies them one at a time. Reads for a
//! broadcast therefore always see a consistent world, and no lock is held
//! while bytes go out on a socket.
//!
//! ### Per-Connection Tasks
//! Every accepted TCP connection gets:
//! - a **reader** (ingestion handler) decoding JSON records into updates
//! - a **writer** draining a queue of pre-encoded snapshot records
//!
//! A failure on either side only ends that one participant's session.
//!
//! ### Broadcast Tick
//! A short fixed interval (10 ms by default). On each tick, if the world is
//! dirty, it is encoded once and queued to every connection.
//!
//! ## Module Organization
//!
//! - `game`: the authoritative world and spawn placement
//! - `client_manager`: connection registry and outbound queues
//! - `network`: accept loop, connection tasks, main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("0.0.0.0:1234", Duration::from_millis(10)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
