//! # Grid World Client Library
//!
//! Client half of the grid world synchronization service. The client never
//! simulates anything itself: it forwards the participant's intent to the
//! server and mirrors whatever world the server publishes.
//!
//! ## Architecture Overview
//!
//! ### Send Side
//! The input collaborator reports what the participant did during a sampling
//! tick (`input::InputManager`). At the tick boundary at most one update
//! record is produced and written to the server. When several directions are
//! held in one tick a fixed priority picks the winner: up, right, down, left.
//!
//! ### Receive Side
//! A dedicated task decodes snapshot records and replaces the cached world in
//! a `tokio::sync::watch` channel. It is a last-write-wins cache, never a
//! merge. A null or empty snapshot is the server's goodbye; the session ends
//! and the front end is expected to exit.
//!
//! ## Module Organization
//!
//! - `network`: connection, send path, receive task
//! - `input`: per-tick batching and terminal command parsing
//! - `game`: read helpers over the cached world for presentation
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::Direction;
//!
//! # async fn demo() -> Result<(), client::network::ClientError> {
//! let (mut client, mut session) = Client::connect("127.0.0.1:1234", "Alice").await?;
//!
//! client.input_mut().press(Direction::Right);
//! client.flush_input().await?;
//!
//! let world = client.state();
//! println!("{}", client::game::describe_state(&world));
//!
//! let _end = session.finished().await?;
//! # Ok(())
//! # }
//! ```

pub mod game;
pub mod input;
pub mod network;
