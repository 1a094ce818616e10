//! Single exit path for every way a run can end.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use forward_core::DebugLogSink;

use super::registry::SessionRegistry;
use crate::api::ControlApi;
use crate::console::Console;
use crate::error::Exit;

/// Upper bound on the debug log upload during exit.
const LOG_SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Message printed on interrupt.
pub const INTERRUPTED: &str = "closing tunnel and exiting...";

/// Prints the final message, closes the transport session and flushes the
/// captured debug log.
///
/// The body runs once. Callers arriving while it is in progress wait for it
/// to finish, print nothing and get the exit status of the first run.
pub struct Teardown {
    registry: Arc<SessionRegistry>,
    api: Arc<dyn ControlApi>,
    debug_log: Arc<DebugLogSink>,
    console: Console,
    finished: OnceCell<Exit>,
}

impl Teardown {
    pub fn new(
        registry: Arc<SessionRegistry>,
        api: Arc<dyn ControlApi>,
        debug_log: Arc<DebugLogSink>,
        console: Console,
    ) -> Self {
        Self {
            registry,
            api,
            debug_log,
            console,
            finished: OnceCell::new(),
        }
    }

    /// Run teardown and return the exit status the process should use.
    pub async fn run(&self, message: &str, exit: Exit) -> Exit {
        *self
            .finished
            .get_or_init(|| self.finish(message, exit))
            .await
    }

    async fn finish(&self, message: &str, exit: Exit) -> Exit {
        self.console.line(message.trim_end());

        if let Some(session) = self.registry.take_for_close() {
            if let Err(e) = session.close().await {
                debug!(error = %e, "Transport session close failed");
            }
        }

        debug!(code = exit.code(), "Exiting");
        if let Some(log) = self.debug_log.take_for_submission() {
            match tokio::time::timeout(LOG_SUBMIT_TIMEOUT, self.api.submit_client_log(log)).await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Debug log submission failed"),
                Err(_) => warn!("Debug log submission timed out"),
            }
        }
        exit
    }
}
