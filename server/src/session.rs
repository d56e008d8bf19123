//! Per-connection session task
//!
//! Each accepted connection runs greet -> read/dispatch loop -> exit:
//! - the welcome banner is queued, then the session registers for broadcasts
//! - every complete input line is logged, dispatched and answered in order
//! - QUIT, EOF, a read or write failure, or shutdown ends the loop
//! - on every exit path the session unregisters and drops its outbox, which
//!   lets the writer task flush and shut the socket down exactly once

use crate::dispatch::dispatch;
use crate::line_reader::LineReader;
use crate::session_registry::{Outbound, SessionId, SessionRegistry, SessionSink};
use crate::shutdown::Shutdown;
use crate::vehicle::Vehicle;
use log::{debug, error, info, warn};
use shared::{truncate_to_bytes, Command, Reply, Role, MAX_LINE, MAX_NAME};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Server-side state of one connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub id: SessionId,
    /// `address:port` of the client
    pub peer: String,
    pub role: Role,
    name: Option<String>,
}

impl SessionState {
    pub fn new(id: SessionId, peer: String) -> Self {
        Self {
            id,
            peer,
            role: Role::Observer,
            name: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Stores a display label, truncated to 63 bytes; an empty label clears it
    pub fn set_name(&mut self, name: &str) {
        let name = truncate_to_bytes(name, MAX_NAME);
        self.name = (!name.is_empty()).then(|| name.to_string());
    }

    pub fn display_name(&self) -> &str {
        self.name().unwrap_or("observer")
    }
}

/// Shared handles every session needs
#[derive(Clone)]
pub struct SessionContext {
    pub vehicle: Arc<Vehicle>,
    pub registry: Arc<SessionRegistry>,
    pub shutdown: Shutdown,
    /// Capacity of each session's outbound queue
    pub outbox_capacity: usize,
}

/// Why a session's read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    Eof,
    ReadError,
    WriteError,
    Shutdown,
}

/// Runs a session over an accepted TCP connection
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: SessionId,
    ctx: SessionContext,
) -> SessionEnd {
    let (reader, writer) = stream.into_split();
    run(reader, writer, id, peer.to_string(), ctx).await
}

/// Runs the session state machine over any split byte stream
pub async fn run<R, W>(
    mut reader: R,
    writer: W,
    id: SessionId,
    peer: String,
    ctx: SessionContext,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    info!("{} connected", peer);

    let (tx, rx) = mpsc::channel::<Outbound>(ctx.outbox_capacity.max(1));
    let writer_task = tokio::spawn(write_loop(writer, rx, peer.clone(), ctx.shutdown.clone()));

    let mut state = SessionState::new(id, peer.clone());
    let end = if send(&tx, &Reply::Welcome).await {
        ctx.registry.register(id, &peer, &tx);
        read_loop(&mut reader, &tx, &mut state, &ctx).await
    } else {
        SessionEnd::WriteError
    };

    ctx.registry.unregister(id);
    drop(tx);
    if let Err(e) = writer_task.await {
        error!("{} writer task failed: {}", peer, e);
    }

    info!("{} disconnected ({:?})", peer, end);
    end
}

async fn send(tx: &SessionSink, reply: &Reply) -> bool {
    tx.send(Outbound::Line(reply.to_wire().into())).await.is_ok()
}

async fn read_loop<R>(
    reader: &mut R,
    tx: &SessionSink,
    state: &mut SessionState,
    ctx: &SessionContext,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; MAX_LINE];
    let mut lines = LineReader::new();

    loop {
        let len = tokio::select! {
            result = reader.read(&mut buffer) => match result {
                Ok(0) => return SessionEnd::Eof,
                Ok(len) => len,
                Err(e) => {
                    warn!("{} read failed: {}", state.peer, e);
                    return SessionEnd::ReadError;
                }
            },
            _ = ctx.shutdown.requested() => return SessionEnd::Shutdown,
        };

        for line in lines.push(&buffer[..len]) {
            info!("{} REQ: {}", state.peer, line);

            let command = Command::parse(&line);
            let reply = dispatch(&command, state, &ctx.vehicle, &ctx.registry);

            // A client that stops reading fills the outbox; shutdown must still win
            let queued = tokio::select! {
                queued = send(tx, &reply) => queued,
                _ = ctx.shutdown.requested() => return SessionEnd::Shutdown,
            };
            if !queued {
                return SessionEnd::WriteError;
            }
            if reply == Reply::Bye {
                info!("{} BYE", state.peer);
                return SessionEnd::Quit;
            }
            info!("{} DONE", state.peer);
        }

        if lines.is_truncating() {
            debug!("{} line exceeds {} bytes, truncating", state.peer, MAX_LINE);
        }
    }
}

/// Drains the outbox into the socket. This is the only place the socket's
/// write side is shut down.
///
/// Once shutdown is requested, queued lines are abandoned and a write stuck
/// on a client that stopped reading is cancelled.
async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    peer: String,
    shutdown: Shutdown,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let item = tokio::select! {
            item = rx.recv() => item,
            _ = shutdown.requested() => break,
        };
        let text = match item {
            Some(Outbound::Line(text)) => text,
            Some(Outbound::Close) | None => break,
        };

        tokio::select! {
            written = writer.write_all(text.as_bytes()) => {
                if let Err(e) = written {
                    warn!("{} write failed: {}", peer, e);
                    break;
                }
            }
            _ = shutdown.requested() => {
                debug!("{} dropping unsent output on shutdown", peer);
                break;
            }
        }
    }

    rx.close();
    if let Err(e) = writer.shutdown().await {
        debug!("{} socket shutdown: {}", peer, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_test::io::Builder;

    const WELCOME_LINE: &str =
        "OK Welcome. Commands: HELLO|AUTH|ROLE?|LIST USERS|SPEED ...|TURN ...|QUIT";

    struct TestClient {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        task: JoinHandle<SessionEnd>,
    }

    impl TestClient {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            timeout(Duration::from_secs(2), self.lines.next_line())
                .await
                .expect("timed out waiting for a line")
                .unwrap()
        }

        async fn request(&mut self, line: &str) -> String {
            self.send(&format!("{}\n", line)).await;
            self.recv().await.expect("connection closed")
        }

        async fn finish(self) -> SessionEnd {
            timeout(Duration::from_secs(2), self.task)
                .await
                .expect("session did not exit")
                .unwrap()
        }
    }

    fn context() -> SessionContext {
        SessionContext {
            vehicle: Arc::new(Vehicle::new()),
            registry: Arc::new(SessionRegistry::new()),
            shutdown: Shutdown::new(),
            outbox_capacity: 16,
        }
    }

    fn connect(ctx: &SessionContext, id: SessionId) -> TestClient {
        connect_with_buffer(ctx, id, 8192)
    }

    fn connect_with_buffer(ctx: &SessionContext, id: SessionId, buffer: usize) -> TestClient {
        let (client, server) = tokio::io::duplex(buffer);
        let (server_reader, server_writer) = tokio::io::split(server);
        let task = tokio::spawn(run(
            server_reader,
            server_writer,
            id,
            format!("127.0.0.1:{}", 4000 + id),
            ctx.clone(),
        ));
        let (client_reader, writer) = tokio::io::split(client);
        TestClient {
            lines: BufReader::new(client_reader).lines(),
            writer,
            task,
        }
    }

    #[test]
    fn test_session_state_names() {
        let mut state = SessionState::new(1, "peer".to_string());
        assert_eq!(state.display_name(), "observer");
        state.set_name("rover");
        assert_eq!(state.name(), Some("rover"));
        state.set_name(&"x".repeat(100));
        assert_eq!(state.display_name().len(), 63);
        state.set_name("");
        assert_eq!(state.name(), None);
    }

    #[tokio::test]
    async fn test_welcome_then_registered() {
        let ctx = context();
        let mut client = connect(&ctx, 1);

        assert_eq!(client.recv().await.unwrap(), WELCOME_LINE);
        // Registration follows the welcome; a round trip guarantees it happened
        assert_eq!(client.request("ROLE?").await, "OK OBSERVER");
        assert!(ctx.registry.contains(1));
    }

    #[tokio::test]
    async fn test_observer_cannot_drive() {
        let ctx = context();
        let mut client = connect(&ctx, 1);
        client.recv().await;

        assert_eq!(client.request("SPEED UP").await, "ERR forbidden");
        assert_eq!(client.request("ROLE?").await, "OK OBSERVER");
        assert_eq!(client.request("QUIT").await, "BYE");
        assert_eq!(client.recv().await, None);
        assert_eq!(client.finish().await, SessionEnd::Quit);

        assert!(ctx.registry.is_empty());
        assert_eq!(ctx.vehicle.snapshot().speed, 0);
    }

    #[tokio::test]
    async fn test_admin_drives_and_turns() {
        let ctx = context();
        let mut client = connect(&ctx, 1);
        client.recv().await;

        assert_eq!(client.request("AUTH admin admin123").await, "OK admin");
        assert_eq!(client.request("SPEED UP").await, "OK speed=5");
        assert_eq!(client.request("TURN LEFT").await, "OK dir=W");
        assert_eq!(client.request("TURN LEFT").await, "OK dir=S");
    }

    #[tokio::test]
    async fn test_fragmented_and_pipelined_input() {
        let ctx = context();
        let mut client = connect(&ctx, 1);
        client.recv().await;

        client.send("AUTH admin ad").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.send("min123\r\nSPEED UP\nSPEED UP\r\nTURN RI").await;
        client.send("GHT\n").await;

        assert_eq!(client.recv().await.unwrap(), "OK admin");
        assert_eq!(client.recv().await.unwrap(), "OK speed=5");
        assert_eq!(client.recv().await.unwrap(), "OK speed=10");
        assert_eq!(client.recv().await.unwrap(), "OK dir=E");
    }

    #[tokio::test]
    async fn test_empty_line_is_unknown() {
        let ctx = context();
        let mut client = connect(&ctx, 1);
        client.recv().await;

        assert_eq!(client.request("").await, "ERR unknown");
        assert_eq!(client.request("HELLO name=ops").await, "OK hello ops");
    }

    #[tokio::test]
    async fn test_eof_unregisters() {
        let ctx = context();
        let mut client = connect(&ctx, 1);
        client.recv().await;
        assert_eq!(client.request("ROLE?").await, "OK OBSERVER");
        assert_eq!(ctx.registry.len(), 1);

        client.writer.shutdown().await.unwrap();
        assert_eq!(client.finish().await, SessionEnd::Eof);
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_ends_session() {
        let ctx = context();
        let mut client = connect(&ctx, 1);
        client.recv().await;
        assert_eq!(client.request("ROLE?").await, "OK OBSERVER");

        ctx.shutdown.trigger();
        assert_eq!(client.recv().await, None);
        assert_eq!(client.finish().await, SessionEnd::Shutdown);
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_interleaves_with_replies() {
        let ctx = context();
        let mut client = connect(&ctx, 1);
        client.recv().await;
        assert_eq!(client.request("ROLE?").await, "OK OBSERVER");

        assert_eq!(ctx.registry.broadcast("TLM test\n"), 1);
        assert_eq!(client.recv().await.unwrap(), "TLM test");
    }

    #[tokio::test]
    async fn test_close_all_closes_socket() {
        let ctx = context();
        let mut client = connect(&ctx, 1);
        client.recv().await;
        assert_eq!(client.request("ROLE?").await, "OK OBSERVER");

        assert_eq!(ctx.registry.close_all(), 1);
        assert_eq!(client.recv().await, None);

        // The next request fails to queue and ends the session
        client.send("ROLE?\n").await;
        assert_eq!(client.finish().await, SessionEnd::WriteError);
    }

    #[tokio::test]
    async fn test_scripted_transcript() {
        let ctx = context();
        let reader = Builder::new()
            .read(b"HELLO name=rover\r\nROLE?\n")
            .read(b"SPEED UP\nQUIT\n")
            .build();
        let writer = Builder::new()
            .write(format!("{}\n", WELCOME_LINE).as_bytes())
            .write(b"OK hello rover\n")
            .write(b"OK OBSERVER\n")
            .write(b"ERR forbidden\n")
            .write(b"BYE\n")
            .build();

        let end = run(reader, writer, 1, "127.0.0.1:4001".to_string(), ctx.clone()).await;
        assert_eq!(end, SessionEnd::Quit);
        assert!(ctx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_with_client_not_reading() {
        let ctx = SessionContext {
            outbox_capacity: 4,
            ..context()
        };
        let TestClient {
            lines,
            mut writer,
            task,
        } = connect_with_buffer(&ctx, 1, 64);

        // Requests keep coming but no reply is ever read, so the pipe and
        // the outbox both fill up and the session blocks on its next reply
        let flood = tokio::spawn(async move {
            while writer.write_all(b"ROLE?\n").await.is_ok() {}
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());

        ctx.shutdown.trigger();
        let end = timeout(Duration::from_secs(2), task)
            .await
            .expect("session must exit on shutdown")
            .unwrap();
        assert_eq!(end, SessionEnd::Shutdown);
        assert!(ctx.registry.is_empty());

        drop(lines);
        timeout(Duration::from_secs(2), flood)
            .await
            .expect("socket should be closed")
            .unwrap();
    }
}
