use std::{
    fmt::Display,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
    thread,
    time::Duration,
};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{compose::escape_html, config::FeedConfig, error::Result, telegram::Destination};

pub const LOG_FILE_MAX_BYTES: u64 = 500 * 1024;
pub const LOG_FILE_BACKUPS: usize = 3;

/// Log to stderr and to `log_file`, rotated at `LOG_FILE_MAX_BYTES`.
/// `RUST_LOG` overrides the `info` default.
pub fn init(log_file: &Path) -> Result<()> {
    if let Some(dir) = log_file.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = RotatingFile::open(log_file, LOG_FILE_MAX_BYTES, LOG_FILE_BACKUPS)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();

    Ok(())
}

/// Append-only file that moves itself to `<name>.1` once it would grow past
/// `max_bytes`. Older backups shift up to `<name>.<backups>`; the one after
/// that is deleted.
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();

        Ok(Self { path: path.to_path_buf(), max_bytes, backups, file, written })
    }

    fn backup(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups == 0 {
            self.file = File::create(&self.path)?;
        } else {
            let oldest = self.backup(self.backups);
            if oldest.exists() {
                fs::remove_file(oldest)?;
            }
            for n in (1..self.backups).rev() {
                let from = self.backup(n);
                if from.exists() {
                    fs::rename(&from, self.backup(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup(1))?;
            self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        }

        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }

        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// Telegram channel that mirrors feed log lines for the operator.
pub struct AdminSink {
    dest: Box<dyn Destination>,
    channel: String,
    pause: Duration,
}

impl AdminSink {
    pub fn new(dest: Box<dyn Destination>, channel: String, pause: Duration) -> Self {
        Self { dest, channel, pause }
    }

    fn forward(&self, severity: Severity, message: &str, feed: &FeedConfig) {
        let text = format!(
            "<code>[{}] {}</code>\ntg_channel = {}\nvk_domain = <code>{}</code>",
            severity.label(),
            escape_html(message),
            self.channel,
            feed.domain,
        );

        thread::sleep(self.pause);
        if let Err(e) = self.dest.send_message(&self.channel, &text) {
            tracing::error!(feed = %feed.name, "failed to forward log line: {}", e);
        }
    }
}

/// Where a log line comes from. Feed lines are also mirrored to the admin sink.
#[derive(Clone, Copy)]
pub struct LogContext<'a> {
    feed: Option<&'a FeedConfig>,
    sink: Option<&'a AdminSink>,
}

impl<'a> LogContext<'a> {
    /// Process-level lines. Never forwarded.
    pub fn system() -> Self {
        Self { feed: None, sink: None }
    }

    pub fn for_feed(feed: &'a FeedConfig, sink: Option<&'a AdminSink>) -> Self {
        Self { feed: Some(feed), sink }
    }

    pub fn info(&self, message: impl Display) {
        self.log(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Display) {
        self.log(Severity::Error, message);
    }

    fn log(&self, severity: Severity, message: impl Display) {
        let message = message.to_string();
        let feed = self.feed.map(|f| f.name.as_str()).unwrap_or("-");

        match severity {
            Severity::Info => tracing::info!(feed, "{}", message),
            Severity::Warn => tracing::warn!(feed, "{}", message),
            Severity::Error => tracing::error!(feed, "{}", message),
        }

        if let (Some(feed), Some(sink)) = (self.feed, self.sink) {
            sink.forward(severity, &message, feed);
        }
    }
}
