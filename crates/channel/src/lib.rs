//! Delivery channel implementation.
//!
//! The messaging session is owned by a supervisor with its own
//! reconnect/backoff policy; the channel itself stays dumb. While the
//! session is down every send fails uniformly with
//! `ChannelError::Disconnected` and the engine retries on later ticks.

pub mod session;
pub mod whatsapp;

pub use session::SessionSupervisor;
pub use whatsapp::WhatsAppChannel;
