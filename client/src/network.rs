use crate::console::render;
use log::{info, warn};
use shared::{Command, ServerMessage};
use std::io::{self, Write};
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Session setup performed right after the welcome banner
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub name: Option<String>,
    pub credentials: Option<(String, String)>,
    /// Print telemetry as JSON objects instead of a summary line
    pub json: bool,
}

/// How a relayed connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The server acknowledged `QUIT`
    Bye,
    /// The server closed the connection without `BYE`
    ServerClosed,
}

/// Delay schedule between reconnect attempts: `base + step * attempt`,
/// capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub step: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            step: Duration::from_secs(2),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base
            .saturating_add(self.step.saturating_mul(attempt))
            .min(self.max)
    }
}

/// Line-oriented connection to the vehicle server
pub struct Client<R, W> {
    lines: Lines<BufReader<R>>,
    writer: W,
}

impl Client<OwnedReadHalf, OwnedWriteHalf> {
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!("Connected to {}", addr);
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer))
    }
}

impl<R, W> Client<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Sends one raw command line; the terminator is added here
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    pub async fn send(&mut self, command: &Command) -> io::Result<()> {
        self.send_line(&command.to_string()).await
    }

    /// Next server line, or None once the server closed the connection
    pub async fn next_message(&mut self) -> io::Result<Option<ServerMessage>> {
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| ServerMessage::parse(&line)))
    }

    /// Waits for the welcome banner, then sends HELLO and AUTH as configured
    pub async fn handshake(&mut self, options: &ClientOptions) -> io::Result<ServerMessage> {
        let welcome = self.next_message().await?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "server closed before welcome")
        })?;

        if let Some(name) = &options.name {
            self.send(&Command::Hello {
                name: Some(name.clone()),
            })
            .await?;
        }
        if let Some((user, password)) = &options.credentials {
            self.send(&Command::Auth {
                user: user.clone(),
                password: password.clone(),
            })
            .await?;
        }

        Ok(welcome)
    }

    /// Forwards `input` lines to the server and prints every server line to
    /// `out` until the server says BYE or closes. End of input sends QUIT.
    ///
    /// `input` is borrowed so that a reconnecting caller can keep reading
    /// the same stream on the next connection.
    pub async fn run<I, O>(
        &mut self,
        input: &mut Lines<I>,
        out: &mut O,
        json: bool,
    ) -> io::Result<Disconnect>
    where
        I: AsyncBufRead + Unpin,
        O: Write,
    {
        let mut input_open = true;

        let end = loop {
            tokio::select! {
                message = self.next_message() => match message? {
                    None => {
                        warn!("Server closed the connection");
                        break Disconnect::ServerClosed;
                    }
                    Some(ServerMessage::Bye) => {
                        writeln!(out, "BYE")?;
                        break Disconnect::Bye;
                    }
                    Some(message) => writeln!(out, "{}", render(&message, json))?,
                },
                line = input.next_line(), if input_open => match line? {
                    Some(line) => self.send_line(line.trim_end()).await?,
                    None => {
                        input_open = false;
                        self.send(&Command::Quit).await?;
                    }
                },
            }
        };

        out.flush()?;
        Ok(end)
    }
}

async fn connect_and_run<I, O>(
    addr: &str,
    options: &ClientOptions,
    input: &mut Lines<I>,
    out: &mut O,
) -> io::Result<Disconnect>
where
    I: AsyncBufRead + Unpin,
    O: Write,
{
    let mut client = Client::connect(addr).await?;
    let welcome = client.handshake(options).await?;
    writeln!(out, "{}", render(&welcome, options.json))?;
    client.run(input, out, options.json).await
}

/// Connects to `addr`, performs the handshake and relays `input` until the
/// session ends.
///
/// With a `reconnect` schedule, a lost or refused connection is retried
/// after the scheduled delay and the handshake (HELLO, AUTH) is repeated.
/// Only a `BYE` from the server ends the loop then.
pub async fn run_session<I, O>(
    addr: &str,
    options: &ClientOptions,
    input: I,
    out: &mut O,
    reconnect: Option<Backoff>,
) -> io::Result<()>
where
    I: AsyncBufRead + Unpin,
    O: Write,
{
    let mut input = input.lines();
    let mut attempt = 0;

    loop {
        let outcome = connect_and_run(addr, options, &mut input, out).await;
        let Some(backoff) = reconnect else {
            return outcome.map(|_| ());
        };

        match outcome {
            Ok(Disconnect::Bye) => return Ok(()),
            Ok(Disconnect::ServerClosed) => attempt = 1,
            Err(e) => {
                attempt += 1;
                warn!("Connection to {} failed: {}", addr, e);
            }
        }

        let delay = backoff.delay(attempt);
        info!("Reconnecting to {} in {:?}", addr, delay);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    const WELCOME: &[u8] =
        b"OK Welcome. Commands: HELLO|AUTH|ROLE?|LIST USERS|SPEED ...|TURN ...|QUIT\n";

    #[tokio::test]
    async fn test_next_message_classifies_lines() {
        let reader = Builder::new()
            .read(WELCOME)
            .read(b"TLM speed=0;battery=100;")
            .read(b"temp=35;dir=N;ts=1700000000\r\n")
            .read(b"ERR forbidden\n")
            .build();
        let mut client = Client::new(reader, Builder::new().build());

        assert!(matches!(
            client.next_message().await.unwrap(),
            Some(ServerMessage::Ok(msg)) if msg.starts_with("Welcome.")
        ));
        match client.next_message().await.unwrap() {
            Some(ServerMessage::Telemetry(tlm)) => {
                assert_eq!(tlm.battery, 100);
                assert_eq!(tlm.ts.as_epoch(), Some(1_700_000_000));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
        assert_eq!(
            client.next_message().await.unwrap(),
            Some(ServerMessage::Err("forbidden".to_string()))
        );
        assert_eq!(client.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_handshake_sends_hello_and_auth() {
        let reader = Builder::new().read(WELCOME).build();
        let writer = Builder::new()
            .write(b"HELLO name=ops")
            .write(b"\n")
            .write(b"AUTH admin admin123")
            .write(b"\n")
            .build();
        let mut client = Client::new(reader, writer);

        let options = ClientOptions {
            name: Some("ops".to_string()),
            credentials: Some(("admin".to_string(), "admin123".to_string())),
            json: false,
        };
        let welcome = client.handshake(&options).await.unwrap();
        assert!(matches!(welcome, ServerMessage::Ok(_)));
    }

    #[tokio::test]
    async fn test_handshake_fails_without_welcome() {
        let mut client = Client::new(Builder::new().build(), Builder::new().build());
        let err = client.handshake(&ClientOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    /// Minimal server: answers each request line from a fixed script
    async fn scripted_server(stream: DuplexStream, script: Vec<(&'static str, &'static str)>) {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();
        for (expected, reply) in script {
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(line, expected);
            writer.write_all(reply.as_bytes()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_forwards_input_until_bye() {
        let (client_end, server_end) = tokio::io::duplex(4096);
        let server = tokio::spawn(scripted_server(
            server_end,
            vec![
                ("SPEED UP", "OK speed=5\n"),
                ("QUIT", "BYE\n"),
            ],
        ));

        let (reader, writer) = tokio::io::split(client_end);
        let mut client = Client::new(reader, writer);
        let mut out = Vec::new();
        let mut input = (&b"SPEED UP\r\n"[..]).lines();
        let end = client.run(&mut input, &mut out, false).await.unwrap();
        server.await.unwrap();

        assert_eq!(end, Disconnect::Bye);
        assert_eq!(String::from_utf8(out).unwrap(), "OK speed=5\nBYE\n");
    }

    #[test]
    fn test_backoff_schedule() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_secs(2));
        assert_eq!(backoff.delay(1), Duration::from_secs(4));
        assert_eq!(backoff.delay(10), Duration::from_secs(22));
        assert_eq!(backoff.delay(14), Duration::from_secs(30));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(30));
    }

    fn quick_backoff() -> Backoff {
        Backoff {
            base: Duration::from_millis(10),
            step: Duration::from_millis(10),
            max: Duration::from_millis(50),
        }
    }

    /// Accepts one connection, greets it and returns the first line it sent
    async fn greet_one(listener: &TcpListener) -> (TcpStream, String) {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(WELCOME).await.unwrap();
        let mut lines = BufReader::new(reader).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        (lines.into_inner().into_inner().reunite(writer).unwrap(), first)
    }

    #[tokio::test]
    async fn test_session_ends_when_server_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (stream, first) = greet_one(&listener).await;
            drop(stream);
            first
        });

        let options = ClientOptions {
            name: Some("ops".to_string()),
            ..Default::default()
        };
        let (_keep_open, input) = tokio::io::duplex(64);
        let mut out = Vec::new();
        let result = run_session(&addr, &options, BufReader::new(input), &mut out, None).await;

        assert!(result.is_ok());
        assert_eq!(server.await.unwrap(), "HELLO name=ops");
        assert!(String::from_utf8(out).unwrap().starts_with("OK Welcome."));
    }

    #[tokio::test]
    async fn test_session_reconnects_and_repeats_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (dropped, first) = greet_one(&listener).await;
            drop(dropped);

            let (mut stream, second) = greet_one(&listener).await;
            stream.write_all(b"BYE\n").await.unwrap();
            (first, second)
        });

        let options = ClientOptions {
            name: Some("ops".to_string()),
            ..Default::default()
        };
        let (_keep_open, input) = tokio::io::duplex(64);
        let mut out = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            run_session(
                &addr,
                &options,
                BufReader::new(input),
                &mut out,
                Some(quick_backoff()),
            ),
        )
        .await
        .expect("client should finish after BYE")
        .unwrap();

        let (first, second) = server.await.unwrap();
        assert_eq!(first, "HELLO name=ops");
        assert_eq!(second, "HELLO name=ops");
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("OK Welcome.").count(), 2);
        assert!(out.ends_with("BYE\n"));
    }

    #[tokio::test]
    async fn test_refused_connection_without_reconnect_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut out = Vec::new();
        let result = run_session(
            &addr,
            &ClientOptions::default(),
            &b""[..],
            &mut out,
            None,
        )
        .await;
        assert!(result.is_err());
    }
}
