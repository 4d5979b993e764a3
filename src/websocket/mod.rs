//! Real-time group channel.
//!
//! - [`BackoffPolicy`]: capped exponential delay between reconnect attempts
//! - [`Session`]: pure connection state machine
//! - [`SyncClient`]: runs a [`Session`] against a [`Connector`] on a tokio task
//! - [`EventRouter`]: decodes inbound frames and hands them to the sync policy
//!
//! # Connection Management
//!
//! A session observes one group at a time. When the socket drops it retries
//! after 1s, 2s, 4s, ... up to 30s, and gives up after 10 consecutive
//! failures, leaving [`ConnectionStatus::Closed`] for the UI to surface.

mod backoff;
mod driver;
mod router;
mod session;
mod transport;

pub use backoff::{BackoffPolicy, ReconnectConfig};
pub use driver::SyncClient;
pub use router::{EventRouter, RouterStats};
pub use session::{ConnectionStatus, Effect, Link, Session, SessionEvent};
pub use transport::{endpoint_url, Connector, Transport, WsConnector, WsTransport};
