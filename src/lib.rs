//! # bets-sync
//!
//! Client library for the Bets group prediction pool API.
//!
//! Besides typed REST access, the crate keeps locally cached group and pool
//! state consistent with the server in near real time:
//! - One WebSocket channel per observed group, with capped exponential
//!   reconnect backoff and a retry ceiling
//! - Server notifications are treated as invalidation hints; the affected
//!   state is always re-read over REST
//! - Connection status is exposed for the UI, failures never propagate
//!
//! ## Layout
//!
//! - [`websocket`]: connection session, transports and frame routing
//! - [`sync`]: which refreshes a notification calls for
//! - [`client`]: REST client, caches and the [`BetsClient`] facade
//!

// Public modules
pub mod client;
pub mod config;
pub mod error;
pub mod sync;
pub mod types;
pub mod websocket;

// Internal modules
mod http;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use types::{
    Group, GroupId, Notification, NotificationKind, OptionId, Pool, PoolId, PoolStatus, User,
    UserId,
};

// Re-export clients
pub use client::{ApiClient, BetsClient, GroupCache, PoolCache};

// Re-export the sync session
pub use sync::{GroupRefresher, PoolRefresher, RefreshAction, Scope, SyncPolicy};
pub use websocket::{ConnectionStatus, EventRouter, SyncClient};
