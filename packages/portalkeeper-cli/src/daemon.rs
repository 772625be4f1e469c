//! Foreground daemon mode for the login service
//!
//! This module keeps the service's timer alive and:
//! - Logs status and speed events as they happen
//! - Exits once the service is stopped from another process
//! - Handles graceful shutdown via SIGTERM/SIGINT, leaving the service marked
//!   as running so the next `portalkeeper daemon` resumes it

use anyhow::Result;
use portalkeeper_core::{Event, Service};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};

/// How often the stored running flag is checked for an external stop
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Run until the service is stopped or a shutdown signal arrives
pub async fn run_daemon(service: Service) -> Result<()> {
    tracing::info!(
        "Daemon running: checking connectivity every {}s",
        service.period().as_secs()
    );

    let mut events = service.orchestrator().events().subscribe();
    let mut stop_poll = interval(STOP_POLL_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(Event::StatusUpdate { status, running }) => {
                    tracing::info!("Status: {}", status);
                    if !running {
                        break;
                    }
                }
                Ok(Event::SpeedUpdate { speed }) => tracing::info!("Speed: {}", speed),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("Missed {} status events", missed);
                }
                Err(RecvError::Closed) => break,
            },
            _ = stop_poll.tick() => {
                match service.orchestrator().store().get_session_state() {
                    Ok(state) if !state.running => {
                        tracing::info!("Service stopped ({}), exiting daemon", state.status);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Keep running, the state file may be mid-rewrite
                        tracing::warn!("Failed to read session state: {:#}", e);
                    }
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::error!("Signal handling failed: {:#}", e);
                }
                tracing::info!("Shutting down, service stays marked as running");
                break;
            }
        }
    }

    tracing::info!("Daemon stopped");
    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C");
    }

    Ok(())
}
