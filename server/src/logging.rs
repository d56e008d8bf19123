//! Log sink: every record goes to stderr and is appended to the log file.
//!
//! Records look like `[2026-10-17T09:30:00Z INFO ] 127.0.0.1:5000 REQ: ROLE?`.
//! Session records start with the peer address, process records with `-`.

use env_logger::{Builder, Env, Target, WriteStyle};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Writer that mirrors each formatted record to stderr and an optional file
pub struct LogSink {
    file: Option<File>,
}

impl LogSink {
    /// Opens `path` for appending, creating it if needed
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Some(file) })
    }

    pub fn stderr_only() -> Self {
        Self { file: None }
    }

    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = &mut self.file {
            // A failing log file must not take the stderr mirror down with it
            if let Err(e) = file.write_all(buf) {
                eprintln!("log file write failed, continuing on stderr: {}", e);
                self.file = None;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &mut self.file {
            file.flush()?;
        }
        io::stderr().flush()
    }
}

/// Installs the global logger. Default level is `info`; `RUST_LOG` overrides it.
///
/// If the log file cannot be opened the error is returned after logging has
/// been set up on stderr alone, so the caller can report it and carry on.
pub fn init(log_path: &Path) -> Option<io::Error> {
    let (sink, open_error) = match LogSink::open(log_path) {
        Ok(sink) => (sink, None),
        Err(e) => (LogSink::stderr_only(), Some(e)),
    };

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5}] {}",
                buf.timestamp_seconds(),
                record.level(),
                record.args()
            )
        })
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(sink)));

    if let Err(e) = builder.try_init() {
        eprintln!("logger already initialized: {}", e);
    }

    open_error
}
