//! Delivery-channel contract. The engine treats the channel as an opaque
//! capability: one send primitive, no internal retry, failures surface as
//! `ChannelError` and are retried on the next tick.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Connection state of the underlying messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A capability that attempts to deliver one message to one recipient.
///
/// Implementations must not retry internally; retry-until-success semantics
/// come from the engine re-attempting the same step on subsequent ticks.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, recipient_id: &str, body: &str) -> Result<(), ChannelError>;
}
