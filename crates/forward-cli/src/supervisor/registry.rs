//! Process-wide handle on the live transport session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::transport::TransportSession;

/// Seconds since traffic was last observed.
#[derive(Debug, Default)]
pub struct ActivityCounter(AtomicU64);

impl ActivityCounter {
    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    /// Count one more idle second and return the new total.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    pub fn inactive_for(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Holds the transport session so that whichever path ends the run
/// (normal exit, failure or interrupt) can close it exactly once.
#[derive(Default)]
pub struct SessionRegistry {
    session: Mutex<Option<Arc<dyn TransportSession>>>,
    closed: AtomicBool,
    activity: ActivityCounter,
}

impl SessionRegistry {
    /// Register the live session. Returns `false` when teardown already
    /// started, in which case the caller owns closing it.
    pub fn install(&self, session: Arc<dyn TransportSession>) -> bool {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        *slot = Some(session);
        self.activity.reset();
        true
    }

    /// Hand out the session for closing. `Some` at most once per process.
    pub fn take_for_close(&self) -> Option<Arc<dyn TransportSession>> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.swap(true, Ordering::SeqCst) {
            return None;
        }
        slot.take()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub const fn activity(&self) -> &ActivityCounter {
        &self.activity
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let installed = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("SessionRegistry")
            .field("installed", &installed)
            .field("closed", &self.is_closed())
            .field("inactive_for", &self.activity.inactive_for())
            .finish()
    }
}
