// Core types and primitives

pub mod strong_types;

pub use strong_types::{
    CommentId, ConversationId, FriendRequestId, GroupId, GroupPostId, MessageId, NotificationId,
    Page, PostId, UserId,
};
