use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use tracing::{error, info, warn};

use crate::engine::{ProgressionEngine, TickError};
use dripflow_core::config::CampaignConfig;
use dripflow_core::error::DripError;

/// Recurring daily trigger: sleeps until the configured send window and
/// fires one tick.
///
/// The engine stays directly invocable (manual runs over the API, tests),
/// this is only the clock. A tick that overruns into the next window makes
/// the overlapping trigger a no-op.
pub struct DailyTrigger {
    engine: Arc<ProgressionEngine>,
    send_time: NaiveTime,
}

impl DailyTrigger {
    pub fn new(engine: Arc<ProgressionEngine>, config: &CampaignConfig) -> Result<Self, DripError> {
        let send_time = NaiveTime::from_hms_opt(config.send_hour, config.send_minute, 0)
            .ok_or_else(|| {
                DripError::Config(format!(
                    "invalid send time {:02}:{:02}",
                    config.send_hour, config.send_minute
                ))
            })?;
        Ok(Self { engine, send_time })
    }

    /// Runs forever, firing one tick per day. Spawn as a background task.
    pub async fn run(self) {
        loop {
            let now = Utc::now();
            let next = next_fire(now, self.send_time);
            let wait = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);
            info!(next = %next, "Scheduler waiting for next send window");
            tokio::time::sleep(wait).await;

            match self.engine.run_tick().await {
                Ok(outcome) => info!(
                    succeeded = outcome.succeeded,
                    failed = outcome.failed,
                    skipped = outcome.skipped,
                    "Scheduled tick finished"
                ),
                Err(TickError::AlreadyRunning) => {
                    warn!("Previous tick still running, trigger dropped");
                }
                Err(e) => error!(error = %e, "Scheduled tick aborted"),
            }
        }
    }
}

/// Next occurrence of `send_time` strictly after `now`.
fn next_fire(now: DateTime<Utc>, send_time: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(send_time).and_utc();
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}
