//! Portalkeeper Core Library
//!
//! Keeps a captive-portal session alive:
//! - Connectivity probing against a well-known 204 endpoint
//! - Round-robin login rotation over a stored credential list
//! - Portal logout and a download speed test
//! - Durable session state (keyring/file) and a best-effort status channel
//!
//! # Features
//!
//! - `keyring-storage` (default): Keep the credential list in the platform keyring
//! - `file-storage`: File-based credential storage only (for headless Linux)
//!
//! # Example
//!
//! ```no_run
//! use portalkeeper_core::{portal, Command, EventBus, FileStore, Orchestrator, Service};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = portal::load_portal_config();
//!     let period = config.check_interval;
//!     let client = Arc::new(portal::PortalClient::new(config)?);
//!     let store = Arc::new(FileStore::new()?);
//!
//!     let orchestrator = Arc::new(Orchestrator::with_portal(store, client.clone(), EventBus::new()));
//!     let service = Service::new(orchestrator, client, period);
//!
//!     // Log in now, then re-check every period
//!     service.handle(Command::Start).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod events;
pub mod orchestrator;
pub mod portal;
pub mod scheduler;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use auth::{Credential, CredentialError};
pub use events::{Event, EventBus};
pub use orchestrator::Orchestrator;
pub use portal::{LoginOutcome, PortalClient, PortalConfig, SpeedResult};
pub use scheduler::{Command, Service, ALARM_NAME};
pub use session::{Phase, SessionPatch, SessionState};
pub use store::{FileStore, MemoryStore, StateStore, WorkerLock};
