//! Command dispatch and the repeating login-cycle timer.

use crate::events::Event;
use crate::orchestrator::Orchestrator;
use crate::portal::SpeedTester;
use crate::session::STATUS_STOPPED_BY_USER;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Name of the repeating login-cycle timer
pub const ALARM_NAME: &str = "autoLoginAlarm";

/// Commands accepted from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    Start,
    Stop,
    Disconnect,
    CheckSpeed,
}

pub struct Service {
    orchestrator: Arc<Orchestrator>,
    speed_tester: Arc<dyn SpeedTester>,
    period: Duration,
    timer: parking_lot::Mutex<Option<CancellationToken>>,
}

impl Service {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        speed_tester: Arc<dyn SpeedTester>,
        period: Duration,
    ) -> Self {
        Self {
            orchestrator,
            speed_tester,
            period,
            timer: parking_lot::Mutex::new(None),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the repeating timer is armed.
    pub fn is_scheduled(&self) -> bool {
        self.timer.lock().is_some()
    }

    pub async fn handle(&self, command: Command) -> Result<()> {
        tracing::debug!("Handling command {:?}", command);
        match command {
            Command::Start => {
                self.arm_timer();
                if let Err(e) = self.orchestrator.start().await {
                    self.disarm_timer();
                    return Err(e);
                }
            }
            Command::Stop => {
                self.disarm_timer();
                self.orchestrator.stop(STATUS_STOPPED_BY_USER)?;
            }
            Command::Disconnect => {
                self.disarm_timer();
                self.orchestrator.disconnect().await?;
            }
            Command::CheckSpeed => {
                let result = self.speed_tester.measure_speed().await;
                tracing::info!("Speed test result: {}", result);
                self.orchestrator.events().publish(Event::SpeedUpdate {
                    speed: result.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Pick up where a previous run left off: if the stored state says the
    /// service was running, run a cycle now and re-arm the timer.
    pub async fn resume_on_startup(&self) -> Result<bool> {
        let state = self.orchestrator.store().get_session_state()?;
        if !state.running {
            tracing::debug!("Service was not running, nothing to resume");
            return Ok(false);
        }

        tracing::info!("Resuming service (last status: {})", state.status);
        self.arm_timer();
        self.orchestrator.run_cycle().await;
        Ok(true)
    }

    fn arm_timer(&self) {
        let token = CancellationToken::new();
        if let Some(previous) = self.timer.lock().replace(token.clone()) {
            previous.cancel();
        }

        let orchestrator = self.orchestrator.clone();
        let period = self.period;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::debug!("Timer '{}' armed, period {:?}", ALARM_NAME, period);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => orchestrator.run_cycle().await,
                }
            }
            tracing::debug!("Timer '{}' cleared", ALARM_NAME);
        });
    }

    fn disarm_timer(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.disarm_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;
    use crate::events::EventBus;
    use crate::portal::{
        Authenticator, ConnectivityProber, Deauthenticator, LoginOutcome, SpeedResult,
    };
    use crate::session::SessionPatch;
    use crate::store::{MemoryStore, StateStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConnectivityProber for CountingProber {
        async fn is_reachable(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct Rejecting;

    #[async_trait]
    impl Authenticator for Rejecting {
        async fn login(&self, _credential: &Credential) -> LoginOutcome {
            LoginOutcome::Failure
        }
    }

    #[async_trait]
    impl Deauthenticator for Rejecting {
        async fn logout(&self, _username: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl SpeedTester for Rejecting {
        async fn measure_speed(&self) -> SpeedResult {
            SpeedResult::Measured { mbps: 40.0 }
        }
    }

    fn service(period: Duration) -> (Service, Arc<MemoryStore>, Arc<CountingProber>) {
        let store = Arc::new(MemoryStore::with_credentials(vec![Credential::new("a", "pw")]));
        let prober = Arc::new(CountingProber::default());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            prober.clone(),
            Arc::new(Rejecting),
            Arc::new(Rejecting),
            EventBus::new(),
        ));
        (Service::new(orchestrator, Arc::new(Rejecting), period), store, prober)
    }

    #[test]
    fn test_command_wire_shape() {
        let parsed: Command = serde_json::from_str(r#"{"action":"checkSpeed"}"#).unwrap();
        assert_eq!(parsed, Command::CheckSpeed);
        assert_eq!(
            serde_json::to_string(&Command::Disconnect).unwrap(),
            r#"{"action":"disconnect"}"#
        );
    }

    #[tokio::test]
    async fn test_start_arms_timer_and_stop_clears_it() {
        let (service, store, prober) = service(Duration::from_millis(20));
        service.handle(Command::Start).await.unwrap();
        assert!(service.is_scheduled());
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(prober.calls.load(Ordering::SeqCst) >= 3);

        service.handle(Command::Stop).await.unwrap();
        assert!(!service.is_scheduled());
        assert!(!store.get_session_state().unwrap().running);
        assert_eq!(store.get_session_state().unwrap().status, STATUS_STOPPED_BY_USER);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_stop = prober.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_disconnect_clears_timer() {
        let (service, store, _) = service(Duration::from_secs(60));
        service.handle(Command::Start).await.unwrap();
        service.handle(Command::Disconnect).await.unwrap();
        assert!(!service.is_scheduled());
        assert_eq!(store.get_session_state().unwrap().status, "Disconnected by user.");
    }

    #[tokio::test]
    async fn test_check_speed_publishes_update() {
        let (service, _, _) = service(Duration::from_secs(60));
        let mut rx = service.orchestrator().events().subscribe();
        service.handle(Command::CheckSpeed).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            Event::SpeedUpdate { speed: "40.00 Mbps".to_string() }
        );
    }

    #[tokio::test]
    async fn test_resume_only_when_running() {
        let (service, store, prober) = service(Duration::from_secs(60));
        assert!(!service.resume_on_startup().await.unwrap());
        assert!(!service.is_scheduled());
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);

        store.set_session_state(SessionPatch::new().running(true)).unwrap();
        assert!(service.resume_on_startup().await.unwrap());
        assert!(service.is_scheduled());
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    }
}
