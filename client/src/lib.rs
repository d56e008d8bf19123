//! # Operator Client Library
//!
//! Terminal client for the vehicle server. It connects over TCP, performs the
//! optional `HELLO`/`AUTH` handshake and then acts as a line relay: commands
//! typed on stdin go to the server, every server line is printed.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Connection handling and the interactive loop:
//! - Welcome banner and handshake
//! - Classification of incoming lines into [`shared::ServerMessage`]
//! - Concurrent relay of stdin and server output until `BYE`
//! - Optional reconnect with a capped linear backoff, repeating the handshake
//!
//! ### Console Module (`console`)
//! Presentation of server messages:
//! - Replies echoed unchanged
//! - Telemetry as a summary line or as JSON
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{run_session, Backoff, ClientOptions};
//!
//! # async fn demo() -> std::io::Result<()> {
//! let options = ClientOptions {
//!     credentials: Some(("admin".into(), "admin123".into())),
//!     ..Default::default()
//! };
//!
//! // Keep the session alive across server restarts
//! let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//! run_session(
//!     "127.0.0.1:9000",
//!     &options,
//!     stdin,
//!     &mut std::io::stdout(),
//!     Some(Backoff::default()),
//! )
//! .await
//! # }
//! ```

pub mod console;
pub mod network;
