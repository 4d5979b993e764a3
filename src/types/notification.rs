use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Kind tag of a server-pushed notification.
///
/// Decoded once from the wire `type` field. Tags this client does not know
/// decode to [`NotificationKind::Unrecognized`] so newer servers never break
/// older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum NotificationKind {
    PoolCreated,
    PoolLocked,
    PoolResolved,
    PoolCancelled,
    BetPlaced,
    MemberJoined,
    MemberKicked,
    PointsGranted,
    Unrecognized(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::PoolCreated => "pool_created",
            NotificationKind::PoolLocked => "pool_locked",
            NotificationKind::PoolResolved => "pool_resolved",
            NotificationKind::PoolCancelled => "pool_cancelled",
            NotificationKind::BetPlaced => "bet_placed",
            NotificationKind::MemberJoined => "member_joined",
            NotificationKind::MemberKicked => "member_kicked",
            NotificationKind::PointsGranted => "points_granted",
            NotificationKind::Unrecognized(tag) => tag,
        }
    }
}

impl From<String> for NotificationKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "pool_created" => NotificationKind::PoolCreated,
            "pool_locked" => NotificationKind::PoolLocked,
            "pool_resolved" => NotificationKind::PoolResolved,
            "pool_cancelled" => NotificationKind::PoolCancelled,
            "bet_placed" => NotificationKind::BetPlaced,
            "member_joined" => NotificationKind::MemberJoined,
            "member_kicked" => NotificationKind::MemberKicked,
            "points_granted" => NotificationKind::PointsGranted,
            _ => NotificationKind::Unrecognized(tag),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound change notification: `{"type": string, "payload": any}`.
///
/// The payload is kept opaque; consumers re-fetch authoritative state instead
/// of trusting it. Only JSON objects decode; arrays and scalars are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub payload: Value,
}

impl<'de> Deserialize<'de> for Notification {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut object = Map::<String, Value>::deserialize(deserializer)?;
        let kind = match object.remove("type") {
            Some(Value::String(tag)) => NotificationKind::from(tag),
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "notification type must be a string, got {}",
                    other
                )))
            }
            None => return Err(de::Error::missing_field("type")),
        };
        Ok(Notification {
            kind,
            payload: object.remove("payload").unwrap_or(Value::Null),
        })
    }
}
