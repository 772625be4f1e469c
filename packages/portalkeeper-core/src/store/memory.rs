use super::StateStore;
use crate::auth::Credential;
use crate::session::{SessionPatch, SessionState};
use anyhow::Result;
use parking_lot::Mutex;

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    credentials: Mutex<Vec<Credential>>,
    session: Mutex<SessionState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: Mutex::new(credentials),
            session: Mutex::new(SessionState::default()),
        }
    }
}

impl StateStore for MemoryStore {
    fn get_credentials(&self) -> Result<Vec<Credential>> {
        Ok(self.credentials.lock().clone())
    }

    fn save_credentials(&self, credentials: &[Credential]) -> Result<()> {
        *self.credentials.lock() = credentials.to_vec();
        Ok(())
    }

    fn get_session_state(&self) -> Result<SessionState> {
        Ok(self.session.lock().clone())
    }

    fn set_session_state(&self, patch: SessionPatch) -> Result<()> {
        self.session.lock().apply(patch);
        Ok(())
    }
}
