use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use dripflow_core::channels::DeliveryChannel;
use dripflow_core::error::StoreError;
use dripflow_core::event_bus::{make_event, EventSink};
use dripflow_core::store::{ContentStore, RecipientRegistry};
use dripflow_core::types::{
    AdvanceOutcome, DeliveryFailure, EventType, Recipient, TickOutcome,
};

use crate::tick::{InvalidTransition, TickPhase, TickStateMachine};

/// A tick that did not complete.
#[derive(Error, Debug)]
pub enum TickError {
    /// An overlapping trigger was suppressed; the in-flight tick is
    /// unaffected.
    #[error("a tick is already running")]
    AlreadyRunning,

    /// The recipient registry could not be read. Nothing was mutated.
    #[error("tick aborted: {0}")]
    Aborted(#[from] StoreError),

    #[error(transparent)]
    State(#[from] InvalidTransition),
}

/// Core orchestration engine — drives the daily delivery progression.
///
/// All collaborators are injected capabilities, so test doubles can
/// simulate channel outages and registry conflicts deterministically.
pub struct ProgressionEngine {
    registry: Arc<dyn RecipientRegistry>,
    content: Arc<dyn ContentStore>,
    channel: Arc<dyn DeliveryChannel>,
    event_sink: Arc<dyn EventSink>,
    campaign_length: u32,
    tick_guard: Mutex<()>,
}

impl ProgressionEngine {
    pub fn new(
        registry: Arc<dyn RecipientRegistry>,
        content: Arc<dyn ContentStore>,
        channel: Arc<dyn DeliveryChannel>,
        campaign_length: u32,
    ) -> Self {
        Self {
            registry,
            content,
            channel,
            event_sink: dripflow_core::event_bus::noop_sink(),
            campaign_length,
            tick_guard: Mutex::new(()),
        }
    }

    /// Attach an event sink for emitting delivery lifecycle events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Runs one scheduling tick: compute the due set, attempt one delivery
    /// per due recipient, commit advancement per recipient.
    ///
    /// At most one tick runs at a time; an overlapping call returns
    /// `TickError::AlreadyRunning` without touching the in-flight tick.
    /// Partial success is still a completed tick — per-recipient failures
    /// end up in the outcome, not in the error.
    pub async fn run_tick(&self) -> Result<TickOutcome, TickError> {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            warn!("Tick trigger overlapped an in-flight tick, suppressing");
            metrics::counter!("tick.suppressed").increment(1);
            return Err(TickError::AlreadyRunning);
        };

        let started = Instant::now();
        let mut machine = TickStateMachine::new();
        machine.transition(TickPhase::Running)?;
        info!("Running daily sequence tick");
        self.event_sink
            .emit(make_event(EventType::TickStarted, None, None, None));

        let active = match self.registry.list_active().await {
            Ok(recipients) => recipients,
            Err(e) => {
                machine.transition(TickPhase::Aborted)?;
                error!(error = %e, "Cannot read recipient registry, aborting tick");
                metrics::counter!("tick.aborted").increment(1);
                self.event_sink.emit(make_event(
                    EventType::TickAborted,
                    None,
                    None,
                    Some(e.to_string()),
                ));
                return Err(TickError::Aborted(e));
            }
        };

        // Due set: active recipients still inside the campaign window.
        // A cursor past the end is normal completion, not a fault.
        let due: Vec<Recipient> = active
            .into_iter()
            .filter(|r| r.current_day <= self.campaign_length)
            .collect();

        let mut outcome = TickOutcome::default();
        for recipient in &due {
            self.process_recipient(recipient, &mut outcome).await;
        }

        machine.transition(TickPhase::Completed)?;
        metrics::histogram!("tick.duration_ms").record(started.elapsed().as_millis() as f64);
        info!(
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "Tick completed"
        );
        self.event_sink
            .emit(make_event(EventType::TickCompleted, None, None, None));
        Ok(outcome)
    }

    /// Drives one recipient through the delivery protocol. Everything that
    /// goes wrong here stays scoped to this recipient; the outcome record
    /// is the only thing that escapes.
    async fn process_recipient(&self, recipient: &Recipient, outcome: &mut TickOutcome) {
        outcome.attempted += 1;
        let day = recipient.current_day;

        let step = match self.content.get(day).await {
            Ok(Some(step)) => step,
            Ok(None) => {
                // Authoring gap: retried once the step lands, not a fault.
                debug!(recipient_id = %recipient.id, day, "No content for day, skipping");
                outcome.skipped += 1;
                metrics::counter!("delivery.skipped").increment(1);
                self.event_sink.emit(make_event(
                    EventType::StepSkipped,
                    Some(recipient.id.clone()),
                    Some(day),
                    None,
                ));
                return;
            }
            Err(e) => {
                self.record_failure(outcome, recipient, day, format!("content store: {e}"));
                return;
            }
        };

        if let Err(e) = self.channel.send(&recipient.id, &step.body).await {
            self.record_failure(outcome, recipient, day, e.to_string());
            return;
        }

        // Commit is scoped to this one recipient; the expected-day guard
        // keeps a stale read from ever double-advancing the cursor.
        match self.registry.advance(&recipient.id, day).await {
            Ok(AdvanceOutcome::Advanced { new_day }) => {
                outcome.succeeded += 1;
                metrics::counter!("delivery.sent").increment(1);
                info!(recipient_id = %recipient.id, day, "Message sent");
                self.event_sink.emit(make_event(
                    EventType::MessageDelivered,
                    Some(recipient.id.clone()),
                    Some(day),
                    None,
                ));
                if new_day > self.campaign_length {
                    self.finish_recipient(&recipient.id).await;
                }
            }
            Ok(AdvanceOutcome::Conflict { actual_day }) => {
                self.record_failure(
                    outcome,
                    recipient,
                    day,
                    format!("cursor conflict: expected {day}, found {actual_day}"),
                );
            }
            Err(e) => {
                self.record_failure(outcome, recipient, day, format!("commit failed: {e}"));
            }
        }
    }

    fn record_failure(
        &self,
        outcome: &mut TickOutcome,
        recipient: &Recipient,
        day: u32,
        reason: String,
    ) {
        warn!(recipient_id = %recipient.id, day, reason = %reason, "Delivery failed");
        metrics::counter!("delivery.failed").increment(1);
        self.event_sink.emit(make_event(
            EventType::DeliveryFailed,
            Some(recipient.id.clone()),
            Some(day),
            Some(reason.clone()),
        ));
        outcome.failed += 1;
        outcome.failures.push(DeliveryFailure {
            recipient_id: recipient.id.clone(),
            day,
            reason,
        });
    }

    async fn finish_recipient(&self, id: &str) {
        match self.registry.mark_completed(id).await {
            Ok(()) => {
                info!(recipient_id = id, "Campaign finished for recipient");
                self.event_sink.emit(make_event(
                    EventType::RecipientCompleted,
                    Some(id.to_string()),
                    None,
                    None,
                ));
            }
            Err(e) => {
                // The cursor is already past the campaign end, so the
                // due-set filter keeps this recipient inert either way.
                warn!(recipient_id = id, error = %e, "Could not mark recipient completed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    use dripflow_core::error::ChannelError;
    use dripflow_core::event_bus::capture_sink;
    use dripflow_store::{InMemoryContentStore, InMemoryRecipientRegistry};

    /// Channel double: fails for scripted ids, records every send.
    #[derive(Default)]
    struct ScriptedChannel {
        failing: StdMutex<HashSet<String>>,
        sent: StdMutex<Vec<(String, String)>>,
    }

    impl ScriptedChannel {
        fn fail_for(&self, id: &str) {
            self.failing.lock().unwrap().insert(id.to_string());
        }

        fn heal(&self, id: &str) {
            self.failing.lock().unwrap().remove(id);
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryChannel for ScriptedChannel {
        async fn send(&self, recipient_id: &str, body: &str) -> Result<(), ChannelError> {
            if self.failing.lock().unwrap().contains(recipient_id) {
                return Err(ChannelError::Transport("channel error".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient_id.to_string(), body.to_string()));
            Ok(())
        }
    }

    /// Registry double whose every call fails, simulating an outage.
    struct UnreachableRegistry;

    #[async_trait]
    impl RecipientRegistry for UnreachableRegistry {
        async fn list_active(&self) -> Result<Vec<Recipient>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn list_all(&self) -> Result<Vec<Recipient>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn enroll(&self, _id: &str) -> Result<Recipient, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn advance(
            &self,
            _id: &str,
            _expected_current_day: u32,
        ) -> Result<AdvanceOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn mark_completed(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    struct Fixture {
        registry: Arc<InMemoryRecipientRegistry>,
        content: Arc<InMemoryContentStore>,
        channel: Arc<ScriptedChannel>,
        engine: ProgressionEngine,
    }

    fn fixture(campaign_length: u32) -> Fixture {
        let registry = Arc::new(InMemoryRecipientRegistry::new());
        let content = Arc::new(InMemoryContentStore::new());
        let channel = Arc::new(ScriptedChannel::default());
        let engine = ProgressionEngine::new(
            registry.clone(),
            content.clone(),
            channel.clone(),
            campaign_length,
        );
        Fixture {
            registry,
            content,
            channel,
            engine,
        }
    }

    async fn cursor_of(registry: &InMemoryRecipientRegistry, id: &str) -> u32 {
        registry
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.id == id)
            .unwrap()
            .current_day
    }

    async fn put_at_day(registry: &InMemoryRecipientRegistry, id: &str, day: u32) {
        registry.enroll(id).await.unwrap();
        for d in 1..day {
            registry.advance(id, d).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_delivers_due_and_skips_gaps() {
        let f = fixture(15);
        f.registry.enroll("r1").await.unwrap();
        put_at_day(&f.registry, "r2", 5).await;
        f.content.upsert(1, "day one".into()).await.unwrap();
        // Day 5 intentionally unauthored.

        let outcome = f.engine.run_tick().await.unwrap();

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(cursor_of(&f.registry, "r1").await, 2);
        assert_eq!(cursor_of(&f.registry, "r2").await, 5);
        assert_eq!(f.channel.sent(), vec![("r1".to_string(), "day one".to_string())]);
    }

    #[tokio::test]
    async fn test_final_day_completes_recipient() {
        let f = fixture(15);
        put_at_day(&f.registry, "r1", 15).await;
        f.content.upsert(15, "grand finale".into()).await.unwrap();

        let sink = capture_sink();
        let engine = ProgressionEngine::new(
            f.registry.clone(),
            f.content.clone(),
            f.channel.clone(),
            15,
        )
        .with_event_sink(sink.clone());

        let outcome = engine.run_tick().await.unwrap();
        assert_eq!(outcome.succeeded, 1);
        // Cursor is bounded at campaign length + 1.
        assert_eq!(cursor_of(&f.registry, "r1").await, 16);
        assert_eq!(sink.count_type(EventType::RecipientCompleted), 1);

        // Finished recipients drop out of every later due set.
        let next = engine.run_tick().await.unwrap();
        assert_eq!(next.attempted, 0);
        assert_eq!(cursor_of(&f.registry, "r1").await, 16);
    }

    #[tokio::test]
    async fn test_failure_leaves_cursor_then_retries() {
        let f = fixture(15);
        put_at_day(&f.registry, "r1", 4).await;
        f.content.upsert(4, "day four".into()).await.unwrap();
        f.channel.fail_for("r1");

        let outcome = f.engine.run_tick().await.unwrap();
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].recipient_id, "r1");
        assert_eq!(outcome.failures[0].day, 4);
        assert!(outcome.failures[0].reason.contains("channel error"));
        assert_eq!(cursor_of(&f.registry, "r1").await, 4);

        // Channel recovers; the same step goes out on the next tick.
        f.channel.heal("r1");
        let outcome = f.engine.run_tick().await.unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(cursor_of(&f.registry, "r1").await, 5);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_touch_other_recipients() {
        let f = fixture(15);
        f.registry.enroll("broken").await.unwrap();
        f.registry.enroll("healthy").await.unwrap();
        f.content.upsert(1, "day one".into()).await.unwrap();
        f.channel.fail_for("broken");

        let outcome = f.engine.run_tick().await.unwrap();

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(cursor_of(&f.registry, "broken").await, 1);
        assert_eq!(cursor_of(&f.registry, "healthy").await, 2);
    }

    #[tokio::test]
    async fn test_registry_outage_aborts_with_no_mutations() {
        let content = Arc::new(InMemoryContentStore::new());
        content.upsert(1, "day one".into()).await.unwrap();
        let channel = Arc::new(ScriptedChannel::default());
        let sink = capture_sink();
        let engine = ProgressionEngine::new(
            Arc::new(UnreachableRegistry),
            content,
            channel.clone(),
            15,
        )
        .with_event_sink(sink.clone());

        let err = engine.run_tick().await.unwrap_err();
        assert!(matches!(err, TickError::Aborted(_)));
        assert!(channel.sent().is_empty());
        assert_eq!(sink.count_type(EventType::TickAborted), 1);
        assert_eq!(sink.count_type(EventType::TickCompleted), 0);
    }

    #[tokio::test]
    async fn test_gap_fills_once_authored() {
        let f = fixture(15);
        put_at_day(&f.registry, "r1", 3).await;

        let outcome = f.engine.run_tick().await.unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(cursor_of(&f.registry, "r1").await, 3);

        f.content.upsert(3, "day three".into()).await.unwrap();
        let outcome = f.engine.run_tick().await.unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(cursor_of(&f.registry, "r1").await, 4);
    }

    #[tokio::test]
    async fn test_reenrollment_restarts_sequence() {
        let f = fixture(15);
        f.registry.enroll("r1").await.unwrap();
        f.content.upsert(1, "day one".into()).await.unwrap();
        f.content.upsert(2, "day two".into()).await.unwrap();

        f.engine.run_tick().await.unwrap();
        assert_eq!(cursor_of(&f.registry, "r1").await, 2);

        f.registry.enroll("r1").await.unwrap();
        assert_eq!(cursor_of(&f.registry, "r1").await, 1);

        f.engine.run_tick().await.unwrap();
        let bodies: Vec<String> = f.channel.sent().into_iter().map(|(_, b)| b).collect();
        assert_eq!(bodies, vec!["day one".to_string(), "day one".to_string()]);
    }

    #[tokio::test]
    async fn test_cursor_conflict_is_isolated_failure() {
        /// Registry double that reports a conflicting cursor on commit.
        struct ConflictingRegistry;

        #[async_trait]
        impl RecipientRegistry for ConflictingRegistry {
            async fn list_active(&self) -> Result<Vec<Recipient>, StoreError> {
                let now = chrono::Utc::now();
                Ok(vec![Recipient {
                    id: "r1".to_string(),
                    current_day: 1,
                    status: dripflow_core::types::RecipientStatus::Active,
                    enrolled_at: now,
                    updated_at: now,
                }])
            }

            async fn list_all(&self) -> Result<Vec<Recipient>, StoreError> {
                self.list_active().await
            }

            async fn enroll(&self, id: &str) -> Result<Recipient, StoreError> {
                Err(StoreError::RecipientNotFound(id.to_string()))
            }

            async fn advance(
                &self,
                _id: &str,
                _expected_current_day: u32,
            ) -> Result<AdvanceOutcome, StoreError> {
                Ok(AdvanceOutcome::Conflict { actual_day: 7 })
            }

            async fn mark_completed(&self, _id: &str) -> Result<(), StoreError> {
                Ok(())
            }
        }

        let content = Arc::new(InMemoryContentStore::new());
        content.upsert(1, "day one".into()).await.unwrap();
        let engine = ProgressionEngine::new(
            Arc::new(ConflictingRegistry),
            content,
            Arc::new(ScriptedChannel::default()),
            15,
        );

        let outcome = engine.run_tick().await.unwrap();
        assert_eq!(outcome.failed, 1);
        assert!(outcome.failures[0].reason.contains("cursor conflict"));
        assert_eq!(outcome.succeeded, 0);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_suppressed() {
        /// Channel double that parks inside `send` until released.
        struct BlockingChannel {
            entered: Notify,
            release: Notify,
        }

        #[async_trait]
        impl DeliveryChannel for BlockingChannel {
            async fn send(&self, _recipient_id: &str, _body: &str) -> Result<(), ChannelError> {
                self.entered.notify_one();
                self.release.notified().await;
                Ok(())
            }
        }

        let registry = Arc::new(InMemoryRecipientRegistry::new());
        registry.enroll("r1").await.unwrap();
        let content = Arc::new(InMemoryContentStore::new());
        content.upsert(1, "day one".into()).await.unwrap();
        let channel = Arc::new(BlockingChannel {
            entered: Notify::new(),
            release: Notify::new(),
        });

        let engine = Arc::new(ProgressionEngine::new(
            registry.clone(),
            content,
            channel.clone(),
            15,
        ));

        let running = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_tick().await }
        });

        // Wait until the first tick is mid-delivery, then trigger again.
        channel.entered.notified().await;
        let overlap = engine.run_tick().await;
        assert!(matches!(overlap, Err(TickError::AlreadyRunning)));

        channel.release.notify_one();
        let outcome = running.await.unwrap().unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(cursor_of(&registry, "r1").await, 2);
    }

    #[tokio::test]
    async fn test_full_campaign_advances_one_day_per_tick() {
        let f = fixture(3);
        f.registry.enroll("r1").await.unwrap();
        for day in 1..=3u32 {
            f.content.upsert(day, format!("day {day}")).await.unwrap();
        }

        // Run more ticks than the campaign has days. The cursor moves by at
        // most 1 per tick, never backwards, and stops at length + 1.
        let mut last_day = 1;
        for _ in 0..5 {
            let _ = f.engine.run_tick().await.unwrap();
            let day = cursor_of(&f.registry, "r1").await;
            assert!(day == last_day || day == last_day + 1);
            assert!(day <= 4);
            last_day = day;
        }

        assert_eq!(cursor_of(&f.registry, "r1").await, 4);
        let bodies: Vec<String> = f.channel.sent().into_iter().map(|(_, b)| b).collect();
        assert_eq!(
            bodies,
            vec!["day 1".to_string(), "day 2".to_string(), "day 3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_outcome_counts_reconcile() {
        let f = fixture(15);
        f.registry.enroll("delivered").await.unwrap();
        f.registry.enroll("failing").await.unwrap();
        put_at_day(&f.registry, "gapped", 9).await;
        f.content.upsert(1, "day one".into()).await.unwrap();
        f.channel.fail_for("failing");

        let outcome = f.engine.run_tick().await.unwrap();

        assert_eq!(outcome.attempted, 3);
        assert_eq!(
            outcome.attempted,
            outcome.succeeded + outcome.failed + outcome.skipped
        );
    }
}
