use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;
use tracing::{info, warn};

use dripflow_core::channels::SessionState;
use dripflow_core::config::ChannelConfig;
use dripflow_core::error::ChannelError;
use dripflow_core::event_bus::{make_event, EventSink};
use dripflow_core::types::EventType;

/// Supervises the messaging session lifecycle.
///
/// Connection loss is handled entirely here: the supervisor re-establishes
/// the session with exponential backoff while senders observe
/// `Disconnected` and fail fast. Nothing above the channel boundary ever
/// waits on a reconnect.
pub struct SessionSupervisor {
    state: RwLock<SessionState>,
    disconnected: Notify,
    initial_backoff: Duration,
    max_backoff: Duration,
    event_sink: Arc<dyn EventSink>,
}

impl SessionSupervisor {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            state: RwLock::new(SessionState::Disconnected),
            disconnected: Notify::new(),
            initial_backoff: Duration::from_millis(config.reconnect_initial_ms),
            max_backoff: Duration::from_millis(config.reconnect_max_ms),
            event_sink: dripflow_core::event_bus::noop_sink(),
        }
    }

    /// Attach an event sink for emitting session lifecycle events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().expect("session state lock poisoned")
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Called by the transport when the session comes up.
    pub fn mark_connected(&self) {
        *self.state.write().expect("session state lock poisoned") = SessionState::Connected;
        info!("Messaging session connected");
        self.event_sink
            .emit(make_event(EventType::SessionConnected, None, None, None));
    }

    /// Called by the transport when the session drops. Wakes the
    /// supervision loop so it starts reconnecting.
    pub fn mark_disconnected(&self, reason: &str) {
        *self.state.write().expect("session state lock poisoned") = SessionState::Disconnected;
        warn!(reason, "Messaging session disconnected");
        self.event_sink.emit(make_event(
            EventType::SessionDisconnected,
            None,
            None,
            Some(reason.to_string()),
        ));
        self.disconnected.notify_one();
    }

    /// Supervision loop: keep the session established for the lifetime of
    /// the process. Runs as a background task.
    pub async fn run(self: Arc<Self>) {
        let mut attempt: u32 = 0;
        loop {
            if self.is_connected() {
                self.disconnected.notified().await;
                attempt = 0;
                continue;
            }

            *self.state.write().expect("session state lock poisoned") = SessionState::Connecting;
            match self.establish().await {
                Ok(()) => {
                    self.mark_connected();
                    attempt = 0;
                }
                Err(e) => {
                    attempt += 1;
                    let delay = backoff_delay(attempt, self.initial_backoff, self.max_backoff);
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Session connect failed, backing off"
                    );
                    metrics::counter!("session.connect_failures").increment(1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Establish the underlying transport session.
    ///
    /// Stub for production integration; a real transport performs the
    /// provider handshake here and registers `mark_disconnected` as its
    /// drop callback.
    async fn establish(&self) -> Result<(), ChannelError> {
        info!("Establishing messaging session");
        Ok(())
    }
}

/// Exponential backoff with jitter, capped at `max`. The jittered delay
/// stays within [cap/2, cap] so reconnect storms spread out without ever
/// exceeding the configured ceiling.
fn backoff_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let shift = attempt.clamp(1, 16) - 1;
    let capped = initial.saturating_mul(1u32 << shift).min(max);
    let base_ms = capped.as_millis() as u64;
    let jittered = base_ms / 2 + rand::thread_rng().gen_range(0..=base_ms / 2);
    Duration::from_millis(jittered)
}
