use std::sync::Arc;

use reqwest::cookie::Jar;
use tracing::{debug, info};

use super::api::ApiClient;
use super::cache::{GroupCache, PoolCache};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::sync::SyncPolicy;
use crate::types::{Group, GroupId, User};
use crate::websocket::{EventRouter, SyncClient, WsConnector};

/// Everything a screen needs: REST access, cached state and the live group
/// channel, sharing one cookie jar.
///
/// # Example
///
/// ```no_run
/// use bets_sync::{BetsClient, ClientConfig, GroupId};
///
/// # async fn demo() -> bets_sync::Result<()> {
/// let client = BetsClient::new(ClientConfig::new("https://bets.example.com")?)?;
/// client.api().login("ada@example.com", "hunter2").await?;
///
/// let group = client.open_group(&GroupId::new("g1")).await?;
/// println!("{} has {} members", group.name, group.members.len());
/// # Ok(())
/// # }
/// ```
pub struct BetsClient {
    config: ClientConfig,
    api: ApiClient,
    groups: GroupCache,
    pools: PoolCache,
    sync: SyncClient,
}

impl BetsClient {
    /// Build the client and start its sync session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        if let Some(cookie) = &config.session_cookie {
            jar.add_cookie_str(cookie, &config.origin);
        }

        let api = ApiClient::new(config.api_base(), Arc::clone(&jar))?;
        let groups = GroupCache::new(api.clone());
        let pools = PoolCache::new(api.clone());

        let policy = SyncPolicy::new(Arc::new(groups.clone()), Arc::new(pools.clone()));
        let connector = WsConnector::new(config.origin.clone()).with_cookies(jar);
        let sync = SyncClient::spawn(connector, EventRouter::new(policy), config.reconnect);

        debug!(origin = %config.origin, "bets client ready");
        Ok(Self {
            config,
            api,
            groups,
            pools,
            sync,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn groups(&self) -> &GroupCache {
        &self.groups
    }

    pub fn pools(&self) -> &PoolCache {
        &self.pools
    }

    pub fn sync(&self) -> &SyncClient {
        &self.sync
    }

    /// The signed-in user, or `None` for an anonymous session
    pub async fn current_user(&self) -> Result<Option<User>> {
        match self.api.me().await {
            Ok(user) => Ok(Some(user)),
            Err(Error::Unauthorized { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Load a group and its pools, then start observing it live
    pub async fn open_group(&self, group_id: &GroupId) -> Result<Group> {
        self.pools.clear_observed();
        let group = self.groups.fetch_group(group_id).await?;
        self.pools.fetch_pools(group_id, None).await?;
        self.sync.connect(group_id.clone());
        info!(group = %group_id, "observing group");
        Ok(group)
    }

    /// Stop observing the current group
    pub fn close_group(&self) {
        self.sync.disconnect();
        self.pools.clear_observed();
    }

    pub async fn logout(&self) -> Result<()> {
        self.sync.disconnect();
        self.api.logout().await?;
        self.groups.clear();
        self.pools.clear();
        Ok(())
    }

    /// Disconnect and stop the sync session
    pub async fn shutdown(self) {
        self.sync.shutdown().await;
    }
}
