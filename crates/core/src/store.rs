//! Persistence contracts consumed by the progression engine and the
//! control surface. Implementations live in `dripflow-store`; the engine
//! only ever sees these traits so test doubles can simulate conflicts and
//! outages deterministically.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{AdvanceOutcome, ContentStep, Recipient};

/// Ordered catalog of campaign steps, addressed by day index.
///
/// Read-only from the engine's perspective; `upsert` is the authoring
/// write path driven by the control surface (last write wins per day).
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Returns the step authored for `day`, if any. Gaps are normal while
    /// a campaign is being authored.
    async fn get(&self, day: u32) -> Result<Option<ContentStep>, StoreError>;

    /// Creates or replaces the step for `day`.
    async fn upsert(&self, day: u32, body: String) -> Result<ContentStep, StoreError>;

    /// Returns all authored steps ordered by day.
    async fn list(&self) -> Result<Vec<ContentStep>, StoreError>;
}

/// Registry of enrolled recipients and their progress cursors.
///
/// The progression engine is the single writer of `current_day`; `advance`
/// is a compare-and-swap against the cursor value the engine read at the
/// start of the tick, so a stale read surfaces as `Conflict` instead of a
/// silent double-advance.
#[async_trait]
pub trait RecipientRegistry: Send + Sync {
    /// Returns all recipients with `Active` status.
    async fn list_active(&self) -> Result<Vec<Recipient>, StoreError>;

    /// Returns every enrolled recipient regardless of status.
    async fn list_all(&self) -> Result<Vec<Recipient>, StoreError>;

    /// Idempotent upsert: enrolling an existing id resets its cursor to 1
    /// and its status to `Active`.
    async fn enroll(&self, id: &str) -> Result<Recipient, StoreError>;

    /// Advances the cursor by exactly 1 iff it still equals
    /// `expected_current_day`.
    async fn advance(
        &self,
        id: &str,
        expected_current_day: u32,
    ) -> Result<AdvanceOutcome, StoreError>;

    /// Transitions a recipient out of the active pool once it has finished
    /// the campaign.
    async fn mark_completed(&self, id: &str) -> Result<(), StoreError>;
}
