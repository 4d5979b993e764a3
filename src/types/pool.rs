use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GroupId, OptionId, PoolId, UserId, UserSummary};

/// Lifecycle state of a pool: open -> locked -> resolved | cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Open,
    Locked,
    Resolved,
    Cancelled,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Open => "open",
            PoolStatus::Locked => "locked",
            PoolStatus::Resolved => "resolved",
            PoolStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the pool can no longer change
    pub fn is_final(&self) -> bool {
        matches!(self, PoolStatus::Resolved | PoolStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolOption {
    pub id: OptionId,
    pub pool_id: PoolId,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub pool_id: PoolId,
    pub user_id: UserId,
    pub option_id: OptionId,
    pub points_wagered: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<UserSummary>,
    #[serde(default)]
    pub option: Option<PoolOption>,
}

/// A prediction pool scoped to a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub group_id: GroupId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: PoolStatus,
    pub created_by: UserId,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub creator: Option<UserSummary>,
    #[serde(default)]
    pub options: Vec<PoolOption>,
    #[serde(default)]
    pub bets: Vec<Bet>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub winning_option_id: Option<OptionId>,
    #[serde(default)]
    pub total_pot: i64,
    #[serde(default)]
    pub bet_count: i64,
}

/// The API sends `""` rather than omitting the winner of an unresolved pool.
fn empty_string_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<OptionId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(OptionId::from))
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePoolRequest {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceBetRequest {
    pub option_id: OptionId,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvePoolRequest {
    pub winning_option_id: OptionId,
}
