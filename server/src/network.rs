//! Acceptor and server lifecycle
//!
//! Startup order: bind the listener, start the broadcaster, enter the accept
//! loop. Shutdown order: stop flag set, accept loop exits, broadcaster stops
//! at its next poll, listener closed, remaining sessions closed.

use crate::broadcaster::Broadcaster;
use crate::error::{Result, ServerError};
use crate::session::{self, SessionContext};
use crate::session_registry::SessionRegistry;
use crate::shutdown::Shutdown;
use crate::vehicle::Vehicle;
use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Runtime settings of the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to listen on
    pub addr: String,
    /// Time between telemetry ticks
    pub telemetry_interval: Duration,
    /// Granularity at which the broadcaster checks the stop flag
    pub shutdown_poll: Duration,
    /// Outbound queue length per session
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:9000".to_string(),
            telemetry_interval: Duration::from_secs(10),
            shutdown_poll: Duration::from_secs(1),
            outbox_capacity: 64,
        }
    }
}

/// Vehicle server owning the listener and the shared state
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    vehicle: Arc<Vehicle>,
    registry: Arc<SessionRegistry>,
    shutdown: Shutdown,
}

impl Server {
    /// Binds the listening socket. Failure here is fatal for the process.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with_vehicle(config, Vehicle::new()).await
    }

    /// Binds with a given starting vehicle state
    pub async fn bind_with_vehicle(config: ServerConfig, vehicle: Vehicle) -> Result<Self> {
        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.addr.clone(),
                source,
            })?;

        Ok(Server {
            listener,
            config,
            vehicle: Arc::new(vehicle),
            registry: Arc::new(SessionRegistry::new()),
            shutdown: Shutdown::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle that stops [`Server::run`] when triggered
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn vehicle(&self) -> Arc<Vehicle> {
        Arc::clone(&self.vehicle)
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Runs the accept loop until shutdown is requested, then tears down
    pub async fn run(self) -> Result<()> {
        info!("- listening on {}", self.local_addr()?);

        let broadcaster = tokio::spawn(
            Broadcaster::new(
                Arc::clone(&self.vehicle),
                Arc::clone(&self.registry),
                self.shutdown.clone(),
                self.config.telemetry_interval,
                self.config.shutdown_poll,
            )
            .run(),
        );

        let ctx = SessionContext {
            vehicle: Arc::clone(&self.vehicle),
            registry: Arc::clone(&self.registry),
            shutdown: self.shutdown.clone(),
            outbox_capacity: self.config.outbox_capacity,
        };

        let outcome = self.accept_loop(&ctx).await;

        // Make sure every task sees the stop flag, even if accept failed
        self.shutdown.trigger();
        if let Err(e) = broadcaster.await {
            error!("- broadcaster task failed: {}", e);
        }

        drop(self.listener);
        let closed = self.registry.close_all();
        info!("- server stopped, closed {} sessions", closed);

        outcome
    }

    async fn accept_loop(&self, ctx: &SessionContext) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = self.shutdown.requested() => {
                    info!("- stop requested, no longer accepting");
                    return Ok(());
                }
            };

            match accepted {
                Ok((stream, peer)) => {
                    let id = self.registry.next_id();
                    // Sessions are detached; they exit on their own or on shutdown
                    tokio::spawn(session::handle_connection(stream, peer, id, ctx.clone()));
                }
                Err(e) if is_transient(&e) => {
                    warn!("- accept interrupted: {}", e);
                }
                Err(e) => {
                    error!("- accept failed: {}", e);
                    return Err(ServerError::Accept(e));
                }
            }
        }
    }
}

/// Errors after which accepting can simply be retried
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::WouldBlock
    )
}
