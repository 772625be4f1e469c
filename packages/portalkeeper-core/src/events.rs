//! Status channel between the service and any observers.
//!
//! Delivery is best-effort: publishing with no subscribers, or to a
//! subscriber that has fallen behind, is not an error. Observers that
//! (re)attach should read the stored session state first.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffered events per subscriber before the oldest are dropped
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "STATUS_UPDATE")]
    StatusUpdate {
        status: String,
        #[serde(rename = "isRunning")]
        running: bool,
    },
    #[serde(rename = "SPEED_UPDATE")]
    SpeedUpdate { speed: String },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}
