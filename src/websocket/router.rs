use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::sync::{RefreshAction, SyncPolicy};
use crate::types::{GroupId, Notification, NotificationKind};

/// Counters of what the router has seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterStats {
    pub routed: u64,
    pub malformed: u64,
    pub unrecognized: u64,
}

/// Decodes inbound frames and hands them to the [`SyncPolicy`]
pub struct EventRouter {
    policy: SyncPolicy,
    routed: AtomicU64,
    malformed: AtomicU64,
    unrecognized: AtomicU64,
}

impl EventRouter {
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            policy,
            routed: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            unrecognized: AtomicU64::new(0),
        }
    }

    /// Decode a raw frame received on `group_id`'s channel and apply it.
    ///
    /// Malformed frames and unknown kinds are dropped; nothing here can fail
    /// the connection.
    pub fn route(&self, raw: &str, group_id: &GroupId) -> Vec<RefreshAction> {
        let trimmed = raw.trim();

        // Skip keep-alives some proxies send as text
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("ping")
            || trimmed.eq_ignore_ascii_case("pong")
        {
            return Vec::new();
        }

        let notification = match serde_json::from_str::<Notification>(trimmed) {
            Ok(notification) => notification,
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    error = %e,
                    frame = %trimmed.chars().take(200).collect::<String>(),
                    "dropping malformed frame"
                );
                return Vec::new();
            }
        };

        if let NotificationKind::Unrecognized(tag) = &notification.kind {
            self.unrecognized.fetch_add(1, Ordering::Relaxed);
            debug!(kind = %tag, "ignoring unrecognized notification");
            return Vec::new();
        }

        self.routed.fetch_add(1, Ordering::Relaxed);
        let scope = self.policy.scope(group_id.clone());
        self.policy.apply(&notification, &scope)
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            routed: self.routed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
        }
    }
}
