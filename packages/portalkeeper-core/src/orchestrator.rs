//! Login-cycle orchestrator.
//!
//! One cycle probes connectivity and, when the link is down, walks the
//! stored credentials once in round-robin order starting from the last one
//! that worked. The running flag is re-read from the store before and after
//! every login attempt so that a stop issued from elsewhere (another task,
//! another process sharing the store) cuts a rotation short within one
//! attempt's latency.
//!
//! The status string is the user-facing result of every transition. Only
//! whether it contains "connected" is machine-meaningful.

use crate::events::{Event, EventBus};
use crate::portal::{Authenticator, ConnectivityProber, Deauthenticator, PortalClient};
use crate::session::{
    FailureReason, Phase, SessionPatch, STATUS_CONNECTED, STATUS_DISCONNECTED,
    STATUS_NO_CREDENTIALS, STATUS_STARTING,
};
use crate::store::StateStore;
use anyhow::Result;
use std::sync::Arc;

pub struct Orchestrator {
    store: Arc<dyn StateStore>,
    prober: Arc<dyn ConnectivityProber>,
    authenticator: Arc<dyn Authenticator>,
    deauthenticator: Arc<dyn Deauthenticator>,
    events: EventBus,
    phase: parking_lot::Mutex<Phase>,
    /// Held for the duration of a cycle; ticks that find it taken are dropped.
    cycle_guard: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn StateStore>,
        prober: Arc<dyn ConnectivityProber>,
        authenticator: Arc<dyn Authenticator>,
        deauthenticator: Arc<dyn Deauthenticator>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            prober,
            authenticator,
            deauthenticator,
            events,
            phase: parking_lot::Mutex::new(Phase::Stopped),
            cycle_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Orchestrator using one portal client for all network access.
    pub fn with_portal(store: Arc<dyn StateStore>, portal: Arc<PortalClient>, events: EventBus) -> Self {
        Self::new(store, portal.clone(), portal.clone(), portal, events)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Mark the service running and run one cycle immediately.
    pub async fn start(&self) -> Result<()> {
        let state = self.store.get_session_state()?;
        let mut patch = SessionPatch::new().running(true).status(STATUS_STARTING);
        if state.last_good_index.is_none() {
            patch = patch.last_good_index(Some(0));
        }
        self.store.set_session_state(patch)?;
        self.set_phase(Phase::Probing);
        self.emit_status(STATUS_STARTING, true);
        tracing::info!("Service started");

        self.run_cycle().await;
        Ok(())
    }

    /// Stop the service, forget the active credential and publish `reason`.
    ///
    /// Safe to call in any phase; stopping twice just republishes.
    pub fn stop(&self, reason: &str) -> Result<()> {
        self.store.set_session_state(
            SessionPatch::new()
                .running(false)
                .status(reason)
                .last_good_index(None),
        )?;
        self.set_phase(Phase::Stopped);
        self.emit_status(reason, false);
        tracing::info!("Service stopped: {}", reason);
        Ok(())
    }

    /// Log the active credential out of the portal, then stop.
    ///
    /// A failed logout is logged and does not prevent the stop.
    pub async fn disconnect(&self) -> Result<()> {
        let state = self.store.get_session_state()?;
        let credentials = self.store.get_credentials()?;

        match state.last_good_index.and_then(|i| credentials.get(i)) {
            Some(active) => {
                if let Err(e) = self.deauthenticator.logout(&active.username).await {
                    tracing::warn!("Logout of '{}' failed: {:#}", active.username, e);
                }
            }
            None => tracing::info!("No active user to log out."),
        }

        self.stop(STATUS_DISCONNECTED)
    }

    /// One probe-then-rotate pass. Invoked by every scheduler tick.
    ///
    /// Never fails: store errors end the cycle and are logged. Returns
    /// immediately if another cycle is already in flight.
    pub async fn run_cycle(&self) {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            tracing::debug!("Login cycle already in flight, skipping tick");
            return;
        };

        if let Err(e) = self.cycle().await {
            tracing::error!("Login cycle aborted: {:#}", e);
        }
    }

    async fn cycle(&self) -> Result<()> {
        if !self.is_running()? {
            tracing::trace!("Service not running, ignoring tick");
            return Ok(());
        }

        self.set_phase(Phase::Probing);
        if self.prober.is_reachable().await {
            let state = self.store.get_session_state()?;
            if !state.running {
                self.set_phase(Phase::Stopped);
                return Ok(());
            }
            self.set_phase(Phase::Connected);
            if !state.is_connected() {
                tracing::info!("Internet reachable");
                self.update_status(STATUS_CONNECTED, SessionPatch::new())?;
            }
            return Ok(());
        }

        let credentials = self.store.get_credentials()?;
        if credentials.is_empty() {
            tracing::warn!("Internet unreachable and no credentials stored");
            return self.stop(STATUS_NO_CREDENTIALS);
        }

        let total = credentials.len();
        let offset = self.store.get_session_state()?.rotation_offset(total);
        tracing::info!(
            "Internet unreachable, rotating {} credentials from position {}",
            total,
            offset + 1
        );
        self.set_phase(Phase::RotatingCredentials);

        for step in 0..total {
            let index = (offset + step) % total;
            let credential = &credentials[index];

            if !self.is_running()? {
                return self.abandon_rotation(step, total);
            }
            self.update_status(
                &format!("Testing: {}/{} ({})", index + 1, total, credential.username),
                SessionPatch::new(),
            )?;

            let outcome = self.authenticator.login(credential).await;

            if !self.is_running()? {
                return self.abandon_rotation(step + 1, total);
            }
            if outcome.is_success() {
                tracing::info!("Logged in as '{}' (ID {})", credential.username, index + 1);
                self.update_status(
                    &format!("Connected with ID {} ({})", index + 1, credential.username),
                    SessionPatch::new().last_good_index(Some(index)),
                )?;
                self.set_phase(Phase::Connected);
                return Ok(());
            }
            tracing::debug!("Login rejected for '{}'", credential.username);
        }

        tracing::warn!("All {} credentials failed, retrying next cycle", total);
        self.update_status(
            &format!("All {} IDs failed. Retrying...", total),
            SessionPatch::new().last_good_index(Some(0)),
        )?;
        self.set_phase(Phase::Failed(FailureReason::AllExhausted));
        Ok(())
    }

    fn abandon_rotation(&self, attempted: usize, total: usize) -> Result<()> {
        tracing::info!(
            "Service stopped mid-rotation after {}/{} attempts",
            attempted,
            total
        );
        self.set_phase(Phase::Stopped);
        Ok(())
    }

    fn is_running(&self) -> Result<bool> {
        Ok(self.store.get_session_state()?.running)
    }

    /// Write an in-cycle status (plus any extra fields) and broadcast it.
    ///
    /// The running flag is deliberately not written here so a concurrent
    /// stop is never overwritten.
    fn update_status(&self, status: &str, patch: SessionPatch) -> Result<()> {
        self.store.set_session_state(patch.status(status))?;
        self.emit_status(status, true);
        Ok(())
    }

    fn emit_status(&self, status: &str, running: bool) {
        self.events.publish(Event::StatusUpdate {
            status: status.to_string(),
            running,
        });
    }

    fn set_phase(&self, phase: Phase) {
        let mut current = self.phase.lock();
        if *current != phase {
            tracing::debug!("Phase {} -> {}", *current, phase);
            *current = phase;
        }
    }
}
