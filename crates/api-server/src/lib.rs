//! Campaign control surface — REST endpoints for enrollment, content
//! authoring, session status, and manual tick runs.

pub mod rest;
pub mod server;

pub use server::ApiServer;
