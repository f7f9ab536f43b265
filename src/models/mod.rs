// Record types exchanged between the engine, the store and the calling layer

pub mod content;
pub mod conversation;
pub mod group;
pub mod notification;
pub mod relationship;
pub mod user;

pub use content::{Comment, FeedPost, LikeOutcome, LikeToggle, Post, PostPatch};
pub use conversation::{Conversation, Message};
pub use group::{Group, GroupMember, GroupPost, GroupPrivacy, GroupRole};
pub use notification::{Notification, NotificationKind};
pub use relationship::{Follow, FriendRequest, FriendRequestDecision, FriendRequestStatus};
pub use user::UserSummary;

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};

/// Stored timestamps are epoch milliseconds
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn from_millis(millis: i64) -> AppResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::Internal(format!("Timestamp {} out of range", millis)))
}

/// Current time truncated to the stored millisecond precision
pub fn now_millis_precision() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
