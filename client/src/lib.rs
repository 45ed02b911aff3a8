//! # Minequery Client Library
//!
//! Client side of the Minequery status protocol, for monitoring tools and
//! dashboards that want to poll a game server.
//!
//! Every call opens a fresh TCP connection, sends one request line and reads
//! until the server closes the connection. Unknown requests get no response
//! at all, which shows up here as an empty string.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::QueryClient;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = QueryClient::new("127.0.0.1:25566", Duration::from_secs(5));
//!
//!     let status = client.status_json().await?;
//!     println!("{}/{} online: {:?}", status.player_count, status.max_players, status.player_list);
//!
//!     let ranks = client.ranks("Alice").await?;
//!     println!("Alice is {} (also {:?})", ranks.primary, ranks.others);
//!     Ok(())
//! }
//! ```

pub mod network;
