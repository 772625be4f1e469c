//! Persisted session state and the orchestrator's phase machine.

use serde::{Deserialize, Serialize};

/// Status shown before the service has ever run.
pub const STATUS_STOPPED: &str = "Service stopped.";
pub const STATUS_STARTING: &str = "Service starting...";
pub const STATUS_CONNECTED: &str = "Connected";
pub const STATUS_STOPPED_BY_USER: &str = "Service stopped by user.";
pub const STATUS_DISCONNECTED: &str = "Disconnected by user.";
pub const STATUS_NO_CREDENTIALS: &str = "No credentials.";

/// Token other components look for to decide whether the link is up.
const CONNECTED_TOKEN: &str = "connected";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    #[serde(rename = "isRunning")]
    pub running: bool,
    pub status: String,
    /// Index of the credential that last logged in successfully.
    /// Persisted as `-1` when there is none.
    #[serde(rename = "currentCredentialIndex", with = "index_or_minus_one")]
    pub last_good_index: Option<usize>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            running: false,
            status: STATUS_STOPPED.to_string(),
            last_good_index: None,
        }
    }
}

impl SessionState {
    /// Whether the status string advertises a live connection.
    pub fn is_connected(&self) -> bool {
        status_indicates_connected(&self.status)
    }

    /// Where a rotation over `len` credentials should begin.
    ///
    /// A stale index (the list shrank since it was recorded) clamps to 0.
    pub fn rotation_offset(&self, len: usize) -> usize {
        match self.last_good_index {
            Some(i) if i < len => i,
            _ => 0,
        }
    }

    /// Apply a merge-patch: fields left unset in `patch` are unchanged.
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(running) = patch.running {
            self.running = running;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(index) = patch.last_good_index {
            self.last_good_index = index;
        }
    }
}

/// Case-insensitive check for the "connected" status token.
///
/// This is a plain substring match over the whole status, usernames
/// included: a leftover `Testing: 1/2 (disconnected01)` reads as connected,
/// so the next reachable probe will not republish "Connected".
pub fn status_indicates_connected(status: &str) -> bool {
    status.to_lowercase().contains(CONNECTED_TOKEN)
}

/// Partial update of [`SessionState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub running: Option<bool>,
    pub status: Option<String>,
    pub last_good_index: Option<Option<usize>>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(mut self, running: bool) -> Self {
        self.running = Some(running);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn last_good_index(mut self, index: Option<usize>) -> Self {
        self.last_good_index = Some(index);
        self
    }
}

/// Why the service is sitting in the failed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Every credential was tried once this cycle and none logged in.
    AllExhausted,
}

/// Phases of the login-cycle orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Probing,
    RotatingCredentials,
    Connected,
    Failed(FailureReason),
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Stopped => write!(f, "stopped"),
            Phase::Probing => write!(f, "probing"),
            Phase::RotatingCredentials => write!(f, "rotating credentials"),
            Phase::Connected => write!(f, "connected"),
            Phase::Failed(FailureReason::AllExhausted) => write!(f, "all credentials failed"),
        }
    }
}

mod index_or_minus_one {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(index: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        match index {
            Some(i) => s.serialize_i64(*i as i64),
            None => s.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        let raw = i64::deserialize(d)?;
        Ok(usize::try_from(raw).ok())
    }
}
