//! User-facing terminal output.
//!
//! Messages go through a shared writer so that the interrupt handler and
//! the supervisor never interleave partial lines, and tests can capture
//! exactly what the user would see.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub struct Console(Arc<Mutex<Box<dyn Write + Send>>>);

impl Console {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Print one message followed by a newline. Write failures are ignored;
    /// there is nowhere left to report them.
    pub fn line(&self, message: &str) {
        let mut out = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{message}");
        let _ = out.flush();
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Console")
    }
}

#[cfg(test)]
impl Console {
    /// Console whose output is collected in memory.
    pub(crate) fn capture() -> (Self, forward_core::tracing_init::CaptureBuffer) {
        let buffer = forward_core::tracing_init::CaptureBuffer::default();
        (Self::new(Box::new(buffer.writer())), buffer)
    }
}
