//! Single-flight session guard.
//!
//! At most one run holds the guard at a time. The only way to take it is
//! [`SessionGuard::try_acquire`], which hands out an RAII [`SessionTicket`];
//! dropping the ticket releases the session, even on panic or when the run
//! future is dropped mid-flight.

use parking_lot::Mutex;
use trellis_core::ids::SessionId;

/// Guard around the current session.
#[derive(Debug, Default)]
pub struct SessionGuard {
    current: Mutex<Option<SessionId>>,
}

impl SessionGuard {
    /// Create an idle guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session, or return the ID of the one already running.
    pub fn try_acquire(&self) -> Result<SessionTicket<'_>, SessionId> {
        let mut current = self.current.lock();
        if let Some(running) = current.as_ref() {
            return Err(running.clone());
        }
        let session_id = SessionId::new();
        *current = Some(session_id.clone());
        Ok(SessionTicket {
            guard: self,
            session_id,
        })
    }

    /// Whether a session is open.
    pub fn is_running(&self) -> bool {
        self.current.lock().is_some()
    }

    /// ID of the open session, if any.
    pub fn current_session(&self) -> Option<SessionId> {
        self.current.lock().clone()
    }
}

/// Proof of holding the session. Releases it on drop.
#[derive(Debug)]
pub struct SessionTicket<'a> {
    guard: &'a SessionGuard,
    session_id: SessionId,
}

impl SessionTicket<'_> {
    /// ID of the held session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

impl Drop for SessionTicket<'_> {
    fn drop(&mut self) {
        *self.guard.current.lock() = None;
    }
}
