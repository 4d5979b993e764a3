use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GroupId, UserId, UserSummary};

/// Role of a member inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

/// A group with its roster and point balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub invite_code: String,
    pub default_points: i64,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub creator: Option<UserSummary>,
    #[serde(default)]
    pub members: Vec<GroupMember>,
}

impl Group {
    /// Look up a member's point balance
    pub fn balance_of(&self, user_id: &UserId) -> Option<i64> {
        self.members
            .iter()
            .find(|m| &m.user_id == user_id)
            .map(|m| m.points_balance)
    }
}

/// Membership row of a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub points_balance: i64,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub default_points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinGroupRequest {
    pub invite_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrantPointsRequest {
    pub user_id: UserId,
    pub amount: i64,
    pub note: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteCodeResponse {
    pub invite_code: String,
}
