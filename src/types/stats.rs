use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GroupId, UserId, UserSummary};

/// One row of a group leaderboard, ranked by balance
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar_url: String,
    pub points_balance: i64,
    pub total_wins: i64,
    pub total_losses: i64,
    pub total_bets: i64,
    pub rank: u32,
}

/// Why a member's balance moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsLogKind {
    Initial,
    AdminGrant,
    BetPlaced,
    BetWon,
    BetRefund,
}

/// Ledger entry of a balance change
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointsLog {
    pub id: String,
    pub group_id: GroupId,
    pub user_id: UserId,
    /// Signed change; negative for wagers
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: PointsLogKind,
    #[serde(default)]
    pub reference_id: String,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

/// A page of the points history, newest first
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<PointsLog>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl HistoryPage {
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.limit) < self.total
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HistoryQuery {
    pub page: u32,
    pub limit: u32,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GroupStats {
    pub total_pools: i64,
    pub open_pools: i64,
    pub resolved_pools: i64,
    pub total_bets: i64,
    pub total_members: i64,
    pub total_points_in_circulation: i64,
}
