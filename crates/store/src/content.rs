use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use dripflow_core::error::StoreError;
use dripflow_core::store::ContentStore;
use dripflow_core::types::ContentStep;

/// Thread-safe in-memory catalog of campaign steps keyed by day.
pub struct InMemoryContentStore {
    steps: DashMap<u32, ContentStep>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        info!("Content store initialized (in-memory, development mode)");
        Self {
            steps: DashMap::new(),
        }
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get(&self, day: u32) -> Result<Option<ContentStep>, StoreError> {
        Ok(self.steps.get(&day).map(|r| r.value().clone()))
    }

    async fn upsert(&self, day: u32, body: String) -> Result<ContentStep, StoreError> {
        let step = ContentStep {
            day,
            body,
            updated_at: Utc::now(),
        };
        self.steps.insert(day, step.clone());
        info!(day, body_len = step.body.len(), "Content step saved");
        Ok(step)
    }

    async fn list(&self) -> Result<Vec<ContentStep>, StoreError> {
        let mut steps: Vec<ContentStep> = self.steps.iter().map(|r| r.value().clone()).collect();
        steps.sort_by_key(|s| s.day);
        Ok(steps)
    }
}
