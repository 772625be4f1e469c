//! Captive portal and network access.
//!
//! The orchestrator talks to the network only through the traits defined
//! here; [`PortalClient`] implements all of them over HTTP.

mod client;
pub mod config;
pub mod speed;

pub use client::{classify_login_response, PortalClient};
pub use config::{load_portal_config, ConfigSource, PortalConfig};
pub use speed::SpeedResult;

use crate::auth::Credential;
use async_trait::async_trait;

/// Result of one login submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    /// Wrong credential, portal error, timeout or transport failure alike
    Failure,
}

impl LoginOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, LoginOutcome::Success)
    }
}

/// Checks whether the wider internet is reachable.
#[async_trait]
pub trait ConnectivityProber: Send + Sync {
    /// Any error, including a timeout, counts as unreachable.
    async fn is_reachable(&self) -> bool;
}

/// Submits one credential to the portal login form.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, credential: &Credential) -> LoginOutcome;
}

/// Ends the portal session of a user.
#[async_trait]
pub trait Deauthenticator: Send + Sync {
    async fn logout(&self, username: &str) -> anyhow::Result<()>;
}

/// Measures download throughput.
#[async_trait]
pub trait SpeedTester: Send + Sync {
    async fn measure_speed(&self) -> SpeedResult;
}
