//! # Snake Royale Server Library
//!
//! This library provides the authoritative server for a multiplayer grid-snake
//! game. It owns the only copy of the world, advances it on a fixed tick, and
//! broadcasts the result to every connected client over WebSockets.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every 120 ms the server moves all snakes one cell, resolves food, resolves
//! collisions on the post-move board and removes the dead. Clients only send
//! intentions (a new direction, a restart, an admin action); positions are
//! never taken from a client.
//!
//! ### Connection Management
//! Each WebSocket connection gets a player id and a single-cell snake when it
//! opens. Closing the connection removes the player's snake and admin grant.
//!
//! ### State Broadcasting
//! After each tick an `update` packet with every live snake and the food set is
//! sent to all connections. Players who died during the tick get an individual
//! `dead` packet first.
//!
//! ## Architecture Design
//!
//! ### Single Game Loop Task
//! Connection tasks never touch the world. They decode frames and push
//! [`network::NetworkEvent`]s onto a queue drained by one game loop task,
//! which also owns the tick interval. Commands and ticks are therefore
//! serialized: a tick always runs against a consistent world.
//!
//! ### Pure Game Logic
//! [`game::GameState`] and the handlers in [`commands`] are plain synchronous
//! code that return the packets to send as [`network::GameMessage`]s. The
//! game loop hands those to [`client_manager::ClientManager`] for delivery.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! World state and the per-tick simulation step.
//!
//! ### Commands Module (`commands`)
//! Routing of connection open/close and player commands into the world,
//! including the admin actions (spawn food, reset game, kick all).
//!
//! ### Client Manager Module (`client_manager`)
//! Registry of open connections and their outbound queues.
//!
//! ### Network Module (`network`)
//! WebSocket accept loop, per-connection tasks and the game loop itself.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     let handle = server.handle();
//!
//!     let game = tokio::spawn(server.run());
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown();
//!     game.await??;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Security Considerations
//!
//! Admin privilege is granted to any player on their first admin command.
//! This gate keeps casual clients from stumbling into admin actions but is not
//! authentication.

pub mod client_manager;
pub mod commands;
pub mod game;
pub mod network;
