//! Mapping from notifications to cache refreshes.
//!
//! The policy never trusts notification payloads. It decides which
//! authoritative reads to re-issue and hands them to the collaborator caches,
//! fire-and-forget.

use std::sync::Arc;

use tracing::debug;

use crate::types::{GroupId, Notification, NotificationKind, PoolId};

/// Group cache operations the sync layer relies on
#[cfg_attr(test, mockall::automock)]
pub trait GroupRefresher: Send + Sync {
    /// Re-fetch the group detail (roster and balances)
    fn refresh_group(&self, group_id: &GroupId);
}

/// Pool cache operations the sync layer relies on
#[cfg_attr(test, mockall::automock)]
pub trait PoolRefresher: Send + Sync {
    /// Re-fetch the pool list of a group
    fn refresh_pools(&self, group_id: &GroupId);

    /// Re-fetch one pool
    fn refresh_pool(&self, group_id: &GroupId, pool_id: &PoolId);

    /// The pool currently on screen, if any
    fn active_pool_id(&self) -> Option<PoolId>;
}

/// The entities the UI currently cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub group_id: GroupId,
    pub active_pool: Option<PoolId>,
}

impl Scope {
    pub fn new(group_id: GroupId, active_pool: Option<PoolId>) -> Self {
        Self {
            group_id,
            active_pool,
        }
    }
}

/// One authoritative re-read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshAction {
    Group(GroupId),
    Pools(GroupId),
    Pool(GroupId, PoolId),
}

/// Decides and issues the refreshes a notification calls for
pub struct SyncPolicy {
    groups: Arc<dyn GroupRefresher>,
    pools: Arc<dyn PoolRefresher>,
}

impl SyncPolicy {
    pub fn new(groups: Arc<dyn GroupRefresher>, pools: Arc<dyn PoolRefresher>) -> Self {
        Self { groups, pools }
    }

    /// Current scope for `group_id`, reading the observed pool from the pool cache
    pub fn scope(&self, group_id: GroupId) -> Scope {
        Scope::new(group_id, self.pools.active_pool_id())
    }

    /// Refreshes warranted by `kind` within `scope`.
    ///
    /// Only ever targets `scope.group_id`.
    pub fn plan(kind: &NotificationKind, scope: &Scope) -> Vec<RefreshAction> {
        match kind {
            NotificationKind::PoolCreated
            | NotificationKind::PoolLocked
            | NotificationKind::PoolResolved
            | NotificationKind::PoolCancelled
            | NotificationKind::BetPlaced => {
                let mut actions = vec![RefreshAction::Pools(scope.group_id.clone())];
                if let Some(pool_id) = &scope.active_pool {
                    actions.push(RefreshAction::Pool(
                        scope.group_id.clone(),
                        pool_id.clone(),
                    ));
                }
                actions
            }
            NotificationKind::MemberJoined
            | NotificationKind::MemberKicked
            | NotificationKind::PointsGranted => {
                vec![RefreshAction::Group(scope.group_id.clone())]
            }
            NotificationKind::Unrecognized(_) => Vec::new(),
        }
    }

    /// Issue the refreshes for `notification`; returns what was issued
    pub fn apply(&self, notification: &Notification, scope: &Scope) -> Vec<RefreshAction> {
        let actions = Self::plan(&notification.kind, scope);
        for action in &actions {
            debug!(kind = %notification.kind, ?action, "issuing refresh");
            match action {
                RefreshAction::Group(group_id) => self.groups.refresh_group(group_id),
                RefreshAction::Pools(group_id) => self.pools.refresh_pools(group_id),
                RefreshAction::Pool(group_id, pool_id) => {
                    self.pools.refresh_pool(group_id, pool_id)
                }
            }
        }
        actions
    }
}
