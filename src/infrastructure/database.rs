// Entity Store Interface - transactional record operations consumed by the engine
// Every operation runs inside a transaction handed in by the caller; there is no
// implicit session and nothing autocommits behind the caller's back.

use async_trait::async_trait;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::collections::BTreeSet;

use crate::core::{CommentId, ConversationId, FriendRequestId, GroupId, Page, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::models::{
    Comment, Conversation, FeedPost, Follow, FriendRequest, FriendRequestStatus, Group,
    GroupMember, GroupPost, Message, Notification, NotificationKind, Post, UserSummary,
};

/// Transaction wrapper for store operations. Dropping it without `commit`
/// rolls every write back.
pub struct StoreTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTransaction {
    pub fn new_sqlite(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub(crate) fn as_sqlite_mut(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit the transaction
    pub async fn commit(self) -> AppResult<()> {
        self.tx.commit().await.map_err(|e| {
            let err = AppError::from(e);
            tracing::warn!("Failed to commit transaction: {}", err);
            err
        })
    }

    /// Rollback the transaction
    pub async fn rollback(self) -> AppResult<()> {
        self.tx.rollback().await.map_err(AppError::from)
    }
}

/// Store interface for the social graph engine.
///
/// Mutations that must be atomic against concurrent callers are expressed as
/// single conditional statements (insert-if-absent, compare-and-set update,
/// insert-if-member) so the outcome is decided by the store, not by a prior read.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn begin_transaction(&self) -> AppResult<StoreTransaction>;

    // Users
    async fn upsert_user(
        &self,
        tx: &mut StoreTransaction,
        id: &UserId,
        username: &str,
        email: Option<&str>,
    ) -> AppResult<()>;
    async fn user_exists(&self, tx: &mut StoreTransaction, id: &UserId) -> AppResult<bool>;
    async fn get_users(
        &self,
        tx: &mut StoreTransaction,
        ids: &[UserId],
    ) -> AppResult<Vec<UserSummary>>;

    // Friend requests
    /// Returns false when a request for the ordered pair already exists
    async fn insert_friend_request(
        &self,
        tx: &mut StoreTransaction,
        request: &FriendRequest,
    ) -> AppResult<bool>;
    async fn get_friend_request(
        &self,
        tx: &mut StoreTransaction,
        id: FriendRequestId,
    ) -> AppResult<Option<FriendRequest>>;
    /// Compare-and-set on (id, receiver, status = from); true if the row moved
    async fn transition_friend_request(
        &self,
        tx: &mut StoreTransaction,
        id: FriendRequestId,
        receiver: &UserId,
        from: FriendRequestStatus,
        to: FriendRequestStatus,
    ) -> AppResult<bool>;
    async fn accepted_friend_ids(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<UserId>>;
    async fn pending_requests_for(
        &self,
        tx: &mut StoreTransaction,
        receiver: &UserId,
    ) -> AppResult<Vec<FriendRequest>>;

    // Follows
    /// Returns false when the edge already exists
    async fn insert_follow(&self, tx: &mut StoreTransaction, follow: &Follow) -> AppResult<bool>;
    async fn get_follow(
        &self,
        tx: &mut StoreTransaction,
        follower: &UserId,
        following: &UserId,
    ) -> AppResult<Option<Follow>>;
    async fn delete_follow(
        &self,
        tx: &mut StoreTransaction,
        follower: &UserId,
        following: &UserId,
    ) -> AppResult<bool>;
    async fn following_ids(
        &self,
        tx: &mut StoreTransaction,
        follower: &UserId,
    ) -> AppResult<Vec<UserId>>;
    async fn follower_ids(
        &self,
        tx: &mut StoreTransaction,
        following: &UserId,
    ) -> AppResult<Vec<UserId>>;

    // Posts
    async fn insert_post(&self, tx: &mut StoreTransaction, post: &Post) -> AppResult<()>;
    async fn get_post(&self, tx: &mut StoreTransaction, id: PostId) -> AppResult<Option<Post>>;
    async fn update_post(&self, tx: &mut StoreTransaction, post: &Post) -> AppResult<bool>;
    /// Removes the post with its likes and comments
    async fn delete_post(&self, tx: &mut StoreTransaction, id: PostId) -> AppResult<bool>;
    /// Posts by any of `authors`, newest first with id as tie breaker
    async fn posts_by_authors(
        &self,
        tx: &mut StoreTransaction,
        viewer: &UserId,
        authors: &BTreeSet<UserId>,
        page: Page,
    ) -> AppResult<Vec<FeedPost>>;
    async fn get_feed_post(
        &self,
        tx: &mut StoreTransaction,
        viewer: &UserId,
        id: PostId,
    ) -> AppResult<Option<FeedPost>>;

    // Likes
    /// Returns false when the (user, post) row was already present
    async fn insert_like(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
        post: PostId,
        created_at_millis: i64,
    ) -> AppResult<bool>;
    async fn delete_like(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
        post: PostId,
    ) -> AppResult<bool>;
    async fn count_likes(&self, tx: &mut StoreTransaction, post: PostId) -> AppResult<u64>;

    // Comments
    async fn insert_comment(&self, tx: &mut StoreTransaction, comment: &Comment) -> AppResult<()>;
    async fn get_comment(
        &self,
        tx: &mut StoreTransaction,
        id: CommentId,
    ) -> AppResult<Option<Comment>>;
    async fn list_comments(&self, tx: &mut StoreTransaction, post: PostId)
        -> AppResult<Vec<Comment>>;
    async fn delete_comment(&self, tx: &mut StoreTransaction, id: CommentId) -> AppResult<bool>;

    // Notifications
    async fn insert_notification(
        &self,
        tx: &mut StoreTransaction,
        notification: &Notification,
    ) -> AppResult<()>;
    /// Inserts unless a row with the same (recipient, actor, kind, post) exists
    async fn insert_notification_if_absent(
        &self,
        tx: &mut StoreTransaction,
        notification: &Notification,
    ) -> AppResult<bool>;
    async fn find_notification(
        &self,
        tx: &mut StoreTransaction,
        recipient: &UserId,
        actor: &UserId,
        kind: NotificationKind,
        post: Option<PostId>,
    ) -> AppResult<Option<Notification>>;
    async fn mark_all_read(&self, tx: &mut StoreTransaction, recipient: &UserId)
        -> AppResult<u64>;
    async fn list_notifications(
        &self,
        tx: &mut StoreTransaction,
        recipient: &UserId,
        page: Page,
    ) -> AppResult<Vec<Notification>>;
    async fn unread_count(&self, tx: &mut StoreTransaction, recipient: &UserId) -> AppResult<u64>;

    // Conversations
    async fn insert_conversation(
        &self,
        tx: &mut StoreTransaction,
        conversation: &Conversation,
    ) -> AppResult<()>;
    /// Returns false when the user already participates
    async fn add_participant(
        &self,
        tx: &mut StoreTransaction,
        conversation: ConversationId,
        user: &UserId,
        joined_at_millis: i64,
    ) -> AppResult<bool>;
    async fn get_conversation(
        &self,
        tx: &mut StoreTransaction,
        id: ConversationId,
    ) -> AppResult<Option<Conversation>>;
    async fn conversation_exists(
        &self,
        tx: &mut StoreTransaction,
        id: ConversationId,
    ) -> AppResult<bool>;
    async fn is_participant(
        &self,
        tx: &mut StoreTransaction,
        conversation: ConversationId,
        user: &UserId,
    ) -> AppResult<bool>;
    async fn conversations_for(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<Conversation>>;
    /// Inserts only if the sender participates in the conversation
    async fn insert_message_if_participant(
        &self,
        tx: &mut StoreTransaction,
        message: &Message,
    ) -> AppResult<bool>;
    /// Oldest first with id as tie breaker
    async fn list_messages(
        &self,
        tx: &mut StoreTransaction,
        conversation: ConversationId,
        page: Page,
    ) -> AppResult<Vec<Message>>;

    // Groups
    /// Inserts the group and its creator's admin membership
    async fn insert_group(&self, tx: &mut StoreTransaction, group: &Group) -> AppResult<()>;
    async fn get_group(&self, tx: &mut StoreTransaction, id: GroupId) -> AppResult<Option<Group>>;
    async fn group_exists(&self, tx: &mut StoreTransaction, id: GroupId) -> AppResult<bool>;
    /// Newest first
    async fn list_groups(&self, tx: &mut StoreTransaction, page: Page) -> AppResult<Vec<Group>>;
    /// Inserts only if the group exists and the user is not a member yet
    async fn insert_group_member(
        &self,
        tx: &mut StoreTransaction,
        member: &GroupMember,
    ) -> AppResult<bool>;
    async fn get_group_member(
        &self,
        tx: &mut StoreTransaction,
        group: GroupId,
        user: &UserId,
    ) -> AppResult<Option<GroupMember>>;
    /// In join order
    async fn list_group_members(
        &self,
        tx: &mut StoreTransaction,
        group: GroupId,
    ) -> AppResult<Vec<GroupMember>>;
    /// Inserts only if the author is a member of the post's group
    async fn insert_group_post_if_member(
        &self,
        tx: &mut StoreTransaction,
        post: &GroupPost,
    ) -> AppResult<bool>;
    /// Newest first with id as tie breaker
    async fn list_group_posts(
        &self,
        tx: &mut StoreTransaction,
        group: GroupId,
        page: Page,
    ) -> AppResult<Vec<GroupPost>>;
}
