use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use dripflow_core::error::StoreError;
use dripflow_core::store::RecipientRegistry;
use dripflow_core::types::{AdvanceOutcome, Recipient, RecipientStatus};

/// Thread-safe in-memory registry of enrolled recipients.
///
/// Cursor writes go through `advance`, which compares against the caller's
/// expected value under the entry lock so concurrent writers cannot
/// double-advance the same recipient.
pub struct InMemoryRecipientRegistry {
    recipients: DashMap<String, Recipient>,
}

impl InMemoryRecipientRegistry {
    pub fn new() -> Self {
        info!("Recipient registry initialized (in-memory, development mode)");
        Self {
            recipients: DashMap::new(),
        }
    }
}

impl Default for InMemoryRecipientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecipientRegistry for InMemoryRecipientRegistry {
    async fn list_active(&self) -> Result<Vec<Recipient>, StoreError> {
        Ok(self
            .recipients
            .iter()
            .filter(|r| r.value().status == RecipientStatus::Active)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Recipient>, StoreError> {
        let mut recipients: Vec<Recipient> =
            self.recipients.iter().map(|r| r.value().clone()).collect();
        recipients.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(recipients)
    }

    async fn enroll(&self, id: &str) -> Result<Recipient, StoreError> {
        let now = Utc::now();
        let recipient = Recipient {
            id: id.to_string(),
            current_day: 1,
            status: RecipientStatus::Active,
            enrolled_at: now,
            updated_at: now,
        };
        self.recipients.insert(id.to_string(), recipient.clone());
        info!(recipient_id = id, "Recipient enrolled");
        Ok(recipient)
    }

    async fn advance(
        &self,
        id: &str,
        expected_current_day: u32,
    ) -> Result<AdvanceOutcome, StoreError> {
        let mut entry = self
            .recipients
            .get_mut(id)
            .ok_or_else(|| StoreError::RecipientNotFound(id.to_string()))?;

        let r = entry.value_mut();
        if r.current_day != expected_current_day {
            return Ok(AdvanceOutcome::Conflict {
                actual_day: r.current_day,
            });
        }

        r.current_day += 1;
        r.updated_at = Utc::now();
        Ok(AdvanceOutcome::Advanced {
            new_day: r.current_day,
        })
    }

    async fn mark_completed(&self, id: &str) -> Result<(), StoreError> {
        let mut entry = self
            .recipients
            .get_mut(id)
            .ok_or_else(|| StoreError::RecipientNotFound(id.to_string()))?;

        entry.value_mut().status = RecipientStatus::Completed;
        entry.value_mut().updated_at = Utc::now();
        info!(recipient_id = id, "Recipient completed campaign");
        Ok(())
    }
}
