//! # Minequery Server Library
//!
//! This library implements the Minequery status protocol: a tiny TCP service
//! that lets external monitoring tools ask a running game server how many
//! players are online, who they are, and which permission groups a player
//! belongs to.
//!
//! ## Protocol
//!
//! A client connects, sends a single line and reads until the server closes
//! the connection. There is no handshake, no authentication and no
//! keep-alive; every connection carries exactly one request.
//!
//! | Request                 | Response                                             |
//! |-------------------------|------------------------------------------------------|
//! | `QUERY`                 | four `KEY value` lines (port, count, max, list)      |
//! | `QUERY_JSON`            | one JSON object with the same four fields            |
//! | `QUERY_RANKS:<player>`  | one JSON object with the player's groups             |
//! | anything else           | nothing, the connection is closed                    |
//!
//! ## Architecture
//!
//! ### Listener (`listener`)
//! Owns the bound socket and runs the accept loop on its own task. Every
//! accepted connection is spawned onto a separate handler task, so accept
//! throughput never depends on how long a request takes. A semaphore caps the
//! number of live handlers; connections beyond the cap are closed at once.
//!
//! ### Connection Handler (`handler`)
//! Reads one bounded line (with a read timeout), dispatches it, writes the
//! response and closes. All I/O errors are absorbed and logged, never
//! propagated to the listener or sibling handlers.
//!
//! ### Host State (`host`)
//! The [`host::HostState`] trait is the only way the protocol core sees the
//! game server. Each request takes a fresh snapshot; nothing is cached.
//!
//! ### Service (`service`) and Console (`admin`)
//! [`service::QueryService`] is the administrative surface the owning
//! process keeps: start, stop, reload, port changes and the debug toggle.
//! The `admin` module turns console lines into calls on it.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{BindAddress, ListenerConfig};
//! use server::host::InMemoryHost;
//! use server::service::QueryService;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = Arc::new(InMemoryHost::new(25565, 32).with_players(["Alice", "Bob"]));
//!     let config = ListenerConfig::new(BindAddress::Any, 25566);
//!
//!     let mut service = QueryService::new(config, host, false);
//!     let addr = service.start().await?;
//!     println!("Answering status queries on {}", addr);
//!
//!     tokio::signal::ctrl_c().await?;
//!     service.stop().await;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod config;
pub mod error;
pub mod handler;
pub mod host;
pub mod listener;
pub mod service;
