use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{FriendRequestId, UserId};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendRequestStatus::Pending => "pending",
            FriendRequestStatus::Accepted => "accepted",
            FriendRequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(FriendRequestStatus::Pending),
            "accepted" => Ok(FriendRequestStatus::Accepted),
            "rejected" => Ok(FriendRequestStatus::Rejected),
            other => Err(AppError::Internal(format!(
                "Unknown friend request status '{}'",
                other
            ))),
        }
    }

    /// Accepted and rejected are terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FriendRequestStatus::Pending)
    }
}

impl fmt::Display for FriendRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The receiver's answer to a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestDecision {
    Accept,
    Reject,
}

impl FriendRequestDecision {
    pub fn target_status(self) -> FriendRequestStatus {
        match self {
            FriendRequestDecision::Accept => FriendRequestStatus::Accepted,
            FriendRequestDecision::Reject => FriendRequestStatus::Rejected,
        }
    }
}

/// Directed request row; friendship is derived from accepted rows in either direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: FriendRequestId,
    pub sender: UserId,
    pub receiver: UserId,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub follower: UserId,
    pub following: UserId,
    pub created_at: DateTime<Utc>,
}
