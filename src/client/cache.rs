//! Local caches of authoritative group and pool state.
//!
//! Both caches are cheap to clone and share their state. Background
//! refreshes requested by the sync layer run on spawned tokio tasks; a
//! refresh requested while an identical one is in flight is folded into a
//! single re-run once the current fetch completes.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::api::ApiClient;
use crate::error::Result;
use crate::sync::{GroupRefresher, PoolRefresher, RefreshAction};
use crate::types::{Bet, Group, GroupId, OptionId, Pool, PoolId, PoolStatus, UserId};

/// Refreshes currently running, with a flag asking for one more pass.
#[derive(Clone, Default)]
struct InFlight(Arc<DashMap<RefreshAction, bool>>);

impl InFlight {
    /// Claim `key`; `false` if a fetch is already running (it will re-run).
    fn begin(&self, key: &RefreshAction) -> bool {
        let mut claimed = false;
        self.0
            .entry(key.clone())
            .and_modify(|rerun| *rerun = true)
            .or_insert_with(|| {
                claimed = true;
                false
            });
        claimed
    }

    /// Release `key` unless another pass was requested meanwhile.
    fn finish(&self, key: &RefreshAction) -> bool {
        if self.0.remove_if(key, |_, rerun| !*rerun).is_some() {
            return true;
        }
        if let Some(mut rerun) = self.0.get_mut(key) {
            *rerun = false;
        }
        false
    }

    #[cfg(test)]
    fn is_running(&self, key: &RefreshAction) -> bool {
        self.0.contains_key(key)
    }
}

/// Run `fetch` on a spawned task unless `key` is already in flight.
///
/// Each pass receives the cache epoch its request observed: the epoch at
/// request time for the first pass, at re-run time for later ones.
fn spawn_coalesced<F, Fut>(
    in_flight: &InFlight,
    key: RefreshAction,
    epoch: &Arc<AtomicU64>,
    fetch: F,
)
where
    F: Fn(u64) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if !in_flight.begin(&key) {
        debug!(?key, "refresh already in flight, coalescing");
        return;
    }
    let in_flight = in_flight.clone();
    let epoch = Arc::clone(epoch);
    let mut requested = epoch.load(Ordering::Acquire);
    tokio::spawn(async move {
        loop {
            fetch(requested).await;
            if in_flight.finish(&key) {
                break;
            }
            requested = epoch.load(Ordering::Acquire);
        }
    });
}

struct GroupState {
    groups: RwLock<Vec<Group>>,
    active: RwLock<Option<Group>>,
    /// Bumped by `clear`; background results from an older epoch are dropped
    epoch: Arc<AtomicU64>,
    revision: watch::Sender<u64>,
    in_flight: InFlight,
}

impl GroupState {
    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    fn store_active(&self, group: Group) {
        *self.active.write() = Some(group);
        self.bump();
    }

    fn store_refreshed(&self, epoch: u64, group: Group) {
        let mut active = self.active.write();
        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!(group = %group.id, "cache cleared during refresh, dropping result");
            return;
        }
        // Drop results for a group the user navigated away from
        if active.as_ref().is_some_and(|current| current.id != group.id) {
            return;
        }
        *active = Some(group);
        drop(active);
        self.bump();
    }
}

/// Cache of the user's groups and the group currently on screen
#[derive(Clone)]
pub struct GroupCache {
    api: ApiClient,
    state: Arc<GroupState>,
}

impl GroupCache {
    pub fn new(api: ApiClient) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            api,
            state: Arc::new(GroupState {
                groups: RwLock::new(Vec::new()),
                active: RwLock::new(None),
                epoch: Arc::new(AtomicU64::new(0)),
                revision,
                in_flight: InFlight::default(),
            }),
        }
    }

    pub fn groups(&self) -> Vec<Group> {
        self.state.groups.read().clone()
    }

    pub fn active_group(&self) -> Option<Group> {
        self.state.active.read().clone()
    }

    /// Receiver bumped every time cached data changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.state.revision.subscribe()
    }

    /// Forget everything, including refreshes still in flight
    pub fn clear(&self) {
        {
            let mut active = self.state.active.write();
            self.state.epoch.fetch_add(1, Ordering::AcqRel);
            *active = None;
        }
        self.state.groups.write().clear();
        self.state.bump();
    }

    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let groups = self.api.list_groups().await?;
        *self.state.groups.write() = groups.clone();
        self.state.bump();
        Ok(groups)
    }

    /// Fetch a group and make it the active one
    pub async fn fetch_group(&self, group_id: &GroupId) -> Result<Group> {
        let group = self.api.get_group(group_id).await?;
        self.state.store_active(group.clone());
        Ok(group)
    }

    pub async fn create_group(&self, name: &str, default_points: i64) -> Result<Group> {
        let group = self.api.create_group(name, default_points).await?;
        self.state.groups.write().push(group.clone());
        self.state.bump();
        Ok(group)
    }

    pub async fn join_group(&self, invite_code: &str) -> Result<Group> {
        let group = self.api.join_group(invite_code).await?;
        self.fetch_groups().await?;
        Ok(group)
    }

    pub async fn update_group(&self, group_id: &GroupId, name: &str, default_points: i64) -> Result<()> {
        self.api.update_group(group_id, name, default_points).await?;
        self.fetch_group(group_id).await?;
        Ok(())
    }

    pub async fn grant_points(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        amount: i64,
        note: &str,
    ) -> Result<()> {
        self.api.grant_points(group_id, user_id, amount, note).await?;
        self.fetch_group(group_id).await?;
        Ok(())
    }

    pub async fn kick_member(&self, group_id: &GroupId, user_id: &UserId) -> Result<()> {
        self.api.kick_member(group_id, user_id).await?;
        self.fetch_group(group_id).await?;
        Ok(())
    }

    pub async fn regenerate_invite(&self, group_id: &GroupId) -> Result<String> {
        let code = self.api.regenerate_invite(group_id).await?;
        let updated = match self.state.active.write().as_mut() {
            Some(group) if &group.id == group_id => {
                group.invite_code = code.clone();
                true
            }
            _ => false,
        };
        if updated {
            self.state.bump();
        }
        Ok(code)
    }
}

impl GroupRefresher for GroupCache {
    fn refresh_group(&self, group_id: &GroupId) {
        let api = self.api.clone();
        let state = Arc::clone(&self.state);
        let id = group_id.clone();
        spawn_coalesced(
            &self.state.in_flight,
            RefreshAction::Group(group_id.clone()),
            &self.state.epoch,
            move |epoch| {
                let api = api.clone();
                let state = Arc::clone(&state);
                let id = id.clone();
                async move {
                    match api.get_group(&id).await {
                        Ok(group) => state.store_refreshed(epoch, group),
                        Err(e) => warn!(group = %id, error = %e, "group refresh failed"),
                    }
                }
            },
        );
    }
}

struct PoolState {
    pools: RwLock<Vec<Pool>>,
    pools_group: RwLock<Option<GroupId>>,
    epoch: Arc<AtomicU64>,
    observed: RwLock<Option<PoolId>>,
    active: RwLock<Option<Pool>>,
    revision: watch::Sender<u64>,
    in_flight: InFlight,
}

impl PoolState {
    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    fn store_pools(&self, group_id: &GroupId, pools: Vec<Pool>) {
        *self.pools.write() = pools;
        *self.pools_group.write() = Some(group_id.clone());
        self.bump();
    }

    fn store_refreshed_pools(&self, epoch: u64, group_id: &GroupId, pools: Vec<Pool>) {
        let mut cached = self.pools.write();
        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!(group = %group_id, "cache cleared during refresh, dropping result");
            return;
        }
        let mut cached_group = self.pools_group.write();
        if cached_group.as_ref().is_some_and(|current| current != group_id) {
            return;
        }
        *cached = pools;
        *cached_group = Some(group_id.clone());
        drop(cached_group);
        drop(cached);
        self.bump();
    }
}

/// Cache of a group's pools and the pool currently on screen
#[derive(Clone)]
pub struct PoolCache {
    api: ApiClient,
    state: Arc<PoolState>,
}

impl PoolCache {
    pub fn new(api: ApiClient) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            api,
            state: Arc::new(PoolState {
                pools: RwLock::new(Vec::new()),
                pools_group: RwLock::new(None),
                epoch: Arc::new(AtomicU64::new(0)),
                observed: RwLock::new(None),
                active: RwLock::new(None),
                revision,
                in_flight: InFlight::default(),
            }),
        }
    }

    pub fn pools(&self) -> Vec<Pool> {
        self.state.pools.read().clone()
    }

    pub fn active_pool(&self) -> Option<Pool> {
        self.state.active.read().clone()
    }

    /// Receiver bumped every time cached data changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.state.revision.subscribe()
    }

    /// Mark `pool_id` as the pool on screen so pool notifications refresh it
    pub fn observe(&self, pool_id: PoolId) {
        let mut observed = self.state.observed.write();
        if observed.as_ref() != Some(&pool_id) {
            *observed = Some(pool_id);
            *self.state.active.write() = None;
        }
    }

    pub fn clear_observed(&self) {
        *self.state.observed.write() = None;
        *self.state.active.write() = None;
        self.state.bump();
    }

    /// Forget everything, including refreshes still in flight
    pub fn clear(&self) {
        {
            let mut pools = self.state.pools.write();
            self.state.epoch.fetch_add(1, Ordering::AcqRel);
            pools.clear();
            *self.state.pools_group.write() = None;
        }
        self.clear_observed();
    }

    pub async fn fetch_pools(&self, group_id: &GroupId, status: Option<PoolStatus>) -> Result<Vec<Pool>> {
        let pools = self.api.list_pools(group_id, status).await?;
        self.state.store_pools(group_id, pools.clone());
        Ok(pools)
    }

    /// Fetch a pool and make it the observed one
    pub async fn fetch_pool(&self, group_id: &GroupId, pool_id: &PoolId) -> Result<Pool> {
        let pool = self.api.get_pool(group_id, pool_id).await?;
        *self.state.observed.write() = Some(pool.id.clone());
        *self.state.active.write() = Some(pool.clone());
        self.state.bump();
        Ok(pool)
    }

    pub async fn create_pool(
        &self,
        group_id: &GroupId,
        title: &str,
        description: &str,
        options: Vec<String>,
    ) -> Result<Pool> {
        let pool = self
            .api
            .create_pool(group_id, title, description, options)
            .await?;
        self.state.pools.write().insert(0, pool.clone());
        self.state.bump();
        Ok(pool)
    }

    pub async fn place_bet(
        &self,
        group_id: &GroupId,
        pool_id: &PoolId,
        option_id: &OptionId,
        points: i64,
    ) -> Result<Bet> {
        let bet = self.api.place_bet(group_id, pool_id, option_id, points).await?;
        self.fetch_pool(group_id, pool_id).await?;
        Ok(bet)
    }

    pub async fn lock_pool(&self, group_id: &GroupId, pool_id: &PoolId) -> Result<()> {
        self.api.lock_pool(group_id, pool_id).await?;
        self.fetch_pool(group_id, pool_id).await?;
        Ok(())
    }

    pub async fn resolve_pool(
        &self,
        group_id: &GroupId,
        pool_id: &PoolId,
        winning_option_id: &OptionId,
    ) -> Result<()> {
        self.api
            .resolve_pool(group_id, pool_id, winning_option_id)
            .await?;
        self.fetch_pool(group_id, pool_id).await?;
        Ok(())
    }

    pub async fn cancel_pool(&self, group_id: &GroupId, pool_id: &PoolId) -> Result<()> {
        self.api.cancel_pool(group_id, pool_id).await?;
        self.fetch_pool(group_id, pool_id).await?;
        Ok(())
    }
}

impl PoolRefresher for PoolCache {
    fn refresh_pools(&self, group_id: &GroupId) {
        let api = self.api.clone();
        let state = Arc::clone(&self.state);
        let id = group_id.clone();
        spawn_coalesced(
            &self.state.in_flight,
            RefreshAction::Pools(group_id.clone()),
            &self.state.epoch,
            move |epoch| {
                let api = api.clone();
                let state = Arc::clone(&state);
                let id = id.clone();
                async move {
                    match api.list_pools(&id, None).await {
                        Ok(pools) => state.store_refreshed_pools(epoch, &id, pools),
                        Err(e) => warn!(group = %id, error = %e, "pool list refresh failed"),
                    }
                }
            },
        );
    }

    fn refresh_pool(&self, group_id: &GroupId, pool_id: &PoolId) {
        let api = self.api.clone();
        let state = Arc::clone(&self.state);
        let (gid, pid) = (group_id.clone(), pool_id.clone());
        spawn_coalesced(
            &self.state.in_flight,
            RefreshAction::Pool(group_id.clone(), pool_id.clone()),
            &self.state.epoch,
            move |_| {
                let api = api.clone();
                let state = Arc::clone(&state);
                let (gid, pid) = (gid.clone(), pid.clone());
                async move {
                    match api.get_pool(&gid, &pid).await {
                        Ok(pool) => {
                            // Only the pool still on screen is worth keeping
                            if state.observed.read().as_ref() == Some(&pid) {
                                *state.active.write() = Some(pool);
                                state.bump();
                            }
                        }
                        Err(e) => warn!(pool = %pid, error = %e, "pool refresh failed"),
                    }
                }
            },
        );
    }

    fn active_pool_id(&self) -> Option<PoolId> {
        self.state.observed.read().clone()
    }
}
