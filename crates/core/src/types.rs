use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single authored step in the campaign sequence, addressed by day index.
/// Day indices start at 1 and may be sparse while authoring is in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentStep {
    pub day: u32,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

/// Enrollment status of a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Active,
    Completed,
}

/// An enrolled recipient with its own progress cursor.
///
/// `current_day` starts at 1 and is advanced by exactly 1 per confirmed
/// delivery, by the progression engine and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub current_day: u32,
    pub status: RecipientStatus,
    pub enrolled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a compare-and-advance on a recipient's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Advanced { new_day: u32 },
    Conflict { actual_day: u32 },
}

/// A delivery failure recorded during a tick. Failures are aggregated into
/// the tick outcome and never propagate past the recipient they belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub recipient_id: String,
    pub day: u32,
    pub reason: String,
}

/// Aggregated outcome of one scheduling tick.
///
/// `attempted` counts every due recipient the tick processed, so
/// `attempted == succeeded + failed + skipped` always holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickOutcome {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub failures: Vec<DeliveryFailure>,
}

/// Delivery lifecycle events emitted through the event sink.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Enrollment events
    RecipientEnrolled,
    RecipientCompleted,
    // Per-delivery events
    MessageDelivered,
    DeliveryFailed,
    StepSkipped,
    // Tick lifecycle events
    TickStarted,
    TickCompleted,
    TickAborted,
    // Session events
    SessionConnected,
    SessionDisconnected,
}

/// A single event record routed to the configured sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub recipient_id: Option<String>,
    pub day: Option<u32>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}
