//! Diagnostic log sink and tracing initialisation.
//!
//! The destination is chosen once at startup from the debug mode:
//! nothing (default), stderr or a file (`--debug`), or an in-memory
//! capture (`--rdebug`) that is shipped to the control API on exit.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Debug mode requested on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DebugMode {
    #[default]
    Off,
    /// `--debug`: diagnostics are written locally.
    Local,
    /// `--rdebug`: diagnostics are captured and submitted on exit.
    Remote,
}

impl DebugMode {
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Where diagnostic output goes.
#[derive(Debug, Clone)]
pub enum LogSink {
    Discard,
    Stderr,
    File(PathBuf),
    BufferedCapture(CaptureBuffer),
}

impl LogSink {
    /// Pick the sink for a debug mode. `log_file` only applies to local mode.
    pub fn select(mode: DebugMode, log_file: Option<PathBuf>) -> Self {
        match (mode, log_file) {
            (DebugMode::Off, _) => Self::Discard,
            (DebugMode::Local, Some(path)) => Self::File(path),
            (DebugMode::Local, None) => Self::Stderr,
            (DebugMode::Remote, _) => Self::BufferedCapture(CaptureBuffer::default()),
        }
    }

    fn make_writer(&self) -> io::Result<BoxMakeWriter> {
        Ok(match self {
            Self::Discard => BoxMakeWriter::new(io::sink),
            Self::Stderr => BoxMakeWriter::new(io::stderr),
            Self::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                BoxMakeWriter::new(Mutex::new(file))
            }
            Self::BufferedCapture(buffer) => BoxMakeWriter::new(buffer.clone()),
        })
    }

    const fn ansi(&self) -> bool {
        matches!(self, Self::Stderr)
    }
}

/// Shared in-memory log buffer, retained for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    /// Copy of everything captured so far.
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// A writer appending to this buffer.
    pub fn writer(&self) -> CaptureWriter {
        CaptureWriter(Arc::clone(&self.0))
    }
}

/// Writer handed out to the fmt layer for each event.
pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureBuffer {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer()
    }
}

/// Process-wide diagnostic buffer with exactly-once hand-off for submission.
#[derive(Debug)]
pub struct DebugLogSink {
    sink: LogSink,
    flushed: AtomicBool,
}

impl DebugLogSink {
    pub const fn new(sink: LogSink) -> Self {
        Self {
            sink,
            flushed: AtomicBool::new(false),
        }
    }

    pub const fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Whether captured output is to be submitted remotely.
    pub const fn is_remote(&self) -> bool {
        matches!(self.sink, LogSink::BufferedCapture(_))
    }

    /// Captured log text for submission. Returns `Some` at most once per
    /// process and only in remote-capture mode.
    pub fn take_for_submission(&self) -> Option<String> {
        let LogSink::BufferedCapture(buffer) = &self.sink else {
            return None;
        };
        if self.flushed.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(buffer.contents())
    }
}

/// Initialise the global tracing subscriber.
///
/// * `sink` -- destination for formatted events.
/// * `mode` -- when enabled, the default filter is `debug` for this
///   workspace and the SSH library; otherwise `warn`. `RUST_LOG` wins.
pub fn init_tracing(sink: &LogSink, mode: DebugMode) -> io::Result<()> {
    let default_filter = if mode.is_enabled() {
        "forward=debug,forward_cli=debug,forward_core=debug,forward_crypto=debug,russh=debug"
    } else {
        "warn,russh=warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(sink.ansi())
        .with_writer(sink.make_writer()?);

    // A second initialisation (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init();
    Ok(())
}
