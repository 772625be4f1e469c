//! Durable key-value storage for the credential list and session state.
//!
//! Two keys are kept: the ordered credential list and the session state.
//! Each is read and replaced as a whole; session updates are merge-patches.

mod file;
mod memory;

pub use file::{FileStore, WorkerLock};
pub use memory::MemoryStore;

use crate::auth::Credential;
use crate::session::{SessionPatch, SessionState};
use anyhow::Result;

pub trait StateStore: Send + Sync {
    /// Credentials in rotation order. Empty when nothing has been stored.
    fn get_credentials(&self) -> Result<Vec<Credential>>;

    /// Replace the whole credential list.
    fn save_credentials(&self, credentials: &[Credential]) -> Result<()>;

    fn get_session_state(&self) -> Result<SessionState>;

    /// Merge `patch` into the stored session state.
    fn set_session_state(&self, patch: SessionPatch) -> Result<()>;
}
