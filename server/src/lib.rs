//! # Vehicle Server Library
//!
//! A TCP server simulating one remotely controlled vehicle. Any number of
//! clients connect over a newline-terminated text protocol; sessions that
//! authenticate as ADMIN may change the vehicle's speed and heading, while
//! every session receives a telemetry line on each simulation tick.
//!
//! ## Architecture
//!
//! ### Tasks
//! - **Acceptor** (`network`): accepts connections and spawns one detached
//!   session task per client.
//! - **Session** (`session`): greets, frames input lines (`line_reader`),
//!   dispatches commands (`dispatch`) and answers in request order. A
//!   per-session writer task owns the socket's write half.
//! - **Broadcaster** (`broadcaster`): ticks the vehicle physics and fans the
//!   resulting `TLM` line out to all sessions.
//!
//! ### Shared State
//! - `vehicle::Vehicle`: speed, battery, temperature and heading behind one
//!   mutex, never held across I/O.
//! - `session_registry::SessionRegistry`: live sessions behind one mutex;
//!   broadcasts copy the sink handles and write without the lock held.
//!
//! ### Shutdown
//! `shutdown::Shutdown` is a process-wide stop flag. The acceptor and the
//! sessions wake on it directly; the broadcaster checks it between short
//! sleeps, which bounds shutdown latency to one poll period.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig {
//!         addr: "127.0.0.1:9000".to_string(),
//!         ..ServerConfig::default()
//!     })
//!     .await?;
//!
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.trigger();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod dispatch;
pub mod error;
pub mod line_reader;
pub mod logging;
pub mod network;
pub mod session;
pub mod session_registry;
pub mod shutdown;
pub mod vehicle;
