// Social Engine - the entry point the calling layer uses
// Every operation runs in its own store transaction, bounded by the configured timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, EngineConfig};
use crate::core::{CommentId, ConversationId, FriendRequestId, GroupId, Page, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, StoreTransaction};
use crate::infrastructure::id_generator::IdGenerator;
use crate::infrastructure::sqlite_database::SqliteStore;
use crate::infrastructure::viewer::ViewerContext;
use crate::models::{
    Comment, Conversation, FeedPost, Follow, FriendRequest, FriendRequestDecision, Group,
    GroupMember, GroupPost, GroupPrivacy, LikeToggle, Message, Notification, Post, PostPatch,
    UserSummary,
};
use crate::services::{
    ContentService, ConversationService, FeedAggregator, GroupService, LikeSet,
    NotificationEngine, RelationshipGraph,
};

/// Open a transaction, run the body with it, commit on success.
/// Only the body is bounded by the operation timeout. Begin is bounded by the
/// pool's acquire timeout and commit by the store's busy timeout, so a commit
/// is never abandoned halfway and a timed out operation never lands.
/// An error or timeout in the body drops the transaction, which rolls it back.
macro_rules! transactional {
    ($engine:expr, $operation:literal, |$tx:ident| $body:block) => {{
        let mut $tx = $engine.store.begin_transaction().await?;
        let value = $engine
            .bounded($operation, async { Ok::<_, AppError>($body) })
            .await?;
        $engine.commit($operation, $tx).await?;
        Ok(value)
    }};
}

#[derive(Clone)]
pub struct SocialEngine {
    store: Arc<dyn EntityStore>,
    config: EngineConfig,
    graph: RelationshipGraph,
    likes: LikeSet,
    notifications: NotificationEngine,
    feed: FeedAggregator,
    conversations: ConversationService,
    content: ContentService,
    groups: GroupService,
}

impl SocialEngine {
    pub fn new(store: Arc<dyn EntityStore>, config: EngineConfig) -> Self {
        let ids = Arc::new(IdGenerator::new(config.node_id));
        let notifications = NotificationEngine::new(Arc::clone(&store), Arc::clone(&ids));
        let graph = RelationshipGraph::new(
            Arc::clone(&store),
            Arc::clone(&ids),
            notifications.clone(),
        );
        let likes = LikeSet::new(Arc::clone(&store), notifications.clone());
        let feed = FeedAggregator::new(Arc::clone(&store), graph.clone());
        let conversations = ConversationService::new(Arc::clone(&store), Arc::clone(&ids));
        let content =
            ContentService::new(Arc::clone(&store), Arc::clone(&ids), notifications.clone());
        let groups = GroupService::new(Arc::clone(&store), ids);

        Self {
            store,
            config,
            graph,
            likes,
            notifications,
            feed,
            conversations,
            content,
            groups,
        }
    }

    /// Connect the SQLite store described by `config` and build the engine on it
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = SqliteStore::connect(&config.database).await?;
        store.health_check().await?;
        Ok(Self::new(Arc::new(store), config.engine.clone()))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.config.operation_timeout_ms)
    }

    fn page(&self, page: Page) -> Page {
        page.clamped(self.config.max_page_size)
    }

    async fn commit(&self, operation: &'static str, tx: StoreTransaction) -> AppResult<()> {
        tx.commit().await.map_err(|err| {
            warn!("{} failed to commit: {}", operation, err);
            err
        })
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let limit = self.operation_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.is_transient() {
                    warn!("{} failed: {}", operation, err);
                } else {
                    debug!("{} rejected: {}", operation, err);
                }
                Err(err)
            }
            Err(_) => {
                warn!("{} timed out after {:?}", operation, limit);
                Err(AppError::StoreUnavailable(format!(
                    "{} timed out after {:?}",
                    operation, limit
                )))
            }
        }
    }

    // Identity mirror

    pub async fn register_user(
        &self,
        id: &UserId,
        username: &str,
        email: Option<&str>,
    ) -> AppResult<UserSummary> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::Validation("Username is empty".to_string()));
        }
        transactional!(self, "register_user", |tx| {
            self.store.upsert_user(&mut tx, id, username, email).await?;
            UserSummary {
                id: id.clone(),
                username: Some(username.to_string()),
            }
        })
    }

    // Relationship graph

    pub async fn send_friend_request(
        &self,
        viewer: &ViewerContext,
        receiver: &UserId,
    ) -> AppResult<FriendRequest> {
        transactional!(self, "send_friend_request", |tx| {
            self.graph
                .send_friend_request(&mut tx, viewer.user_id(), receiver)
                .await?
        })
    }

    pub async fn respond_to_friend_request(
        &self,
        viewer: &ViewerContext,
        request_id: FriendRequestId,
        decision: FriendRequestDecision,
    ) -> AppResult<FriendRequest> {
        transactional!(self, "respond_to_friend_request", |tx| {
            self.graph
                .respond_to_friend_request(&mut tx, request_id, viewer.user_id(), decision)
                .await?
        })
    }

    pub async fn pending_friend_requests(
        &self,
        viewer: &ViewerContext,
    ) -> AppResult<Vec<FriendRequest>> {
        transactional!(self, "pending_friend_requests", |tx| {
            self.graph.pending_requests(&mut tx, viewer.user_id()).await?
        })
    }

    pub async fn follow(&self, viewer: &ViewerContext, target: &UserId) -> AppResult<Follow> {
        transactional!(self, "follow", |tx| {
            self.graph.follow(&mut tx, viewer.user_id(), target).await?
        })
    }

    pub async fn unfollow(&self, viewer: &ViewerContext, target: &UserId) -> AppResult<bool> {
        transactional!(self, "unfollow", |tx| {
            self.graph.unfollow(&mut tx, viewer.user_id(), target).await?
        })
    }

    pub async fn list_friends(&self, user: &UserId) -> AppResult<Vec<UserSummary>> {
        transactional!(self, "list_friends", |tx| {
            self.graph.list_friends(&mut tx, user).await?
        })
    }

    pub async fn list_following(&self, user: &UserId) -> AppResult<Vec<UserSummary>> {
        transactional!(self, "list_following", |tx| {
            self.graph.list_following(&mut tx, user).await?
        })
    }

    pub async fn list_followers(&self, user: &UserId) -> AppResult<Vec<UserSummary>> {
        transactional!(self, "list_followers", |tx| {
            self.graph.list_followers(&mut tx, user).await?
        })
    }

    // Posts and comments

    pub async fn create_post(
        &self,
        viewer: &ViewerContext,
        caption: Option<&str>,
        image: Option<&str>,
    ) -> AppResult<Post> {
        transactional!(self, "create_post", |tx| {
            self.content
                .create_post(&mut tx, viewer.user_id(), caption, image)
                .await?
        })
    }

    pub async fn update_post(
        &self,
        viewer: &ViewerContext,
        post_id: PostId,
        patch: &PostPatch,
    ) -> AppResult<Post> {
        transactional!(self, "update_post", |tx| {
            self.content
                .update_post(&mut tx, viewer.user_id(), post_id, patch)
                .await?
        })
    }

    pub async fn delete_post(&self, viewer: &ViewerContext, post_id: PostId) -> AppResult<()> {
        transactional!(self, "delete_post", |tx| {
            self.content
                .delete_post(&mut tx, viewer.user_id(), post_id)
                .await?
        })
    }

    pub async fn get_post(&self, viewer: &ViewerContext, post_id: PostId) -> AppResult<FeedPost> {
        transactional!(self, "get_post", |tx| {
            self.feed.view_post(&mut tx, viewer.user_id(), post_id).await?
        })
    }

    pub async fn create_comment(
        &self,
        viewer: &ViewerContext,
        post_id: PostId,
        content: &str,
    ) -> AppResult<Comment> {
        transactional!(self, "create_comment", |tx| {
            self.content
                .create_comment(&mut tx, viewer.user_id(), post_id, content)
                .await?
        })
    }

    pub async fn list_comments(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
        transactional!(self, "list_comments", |tx| {
            self.content.list_comments(&mut tx, post_id).await?
        })
    }

    pub async fn delete_comment(
        &self,
        viewer: &ViewerContext,
        comment_id: CommentId,
    ) -> AppResult<()> {
        transactional!(self, "delete_comment", |tx| {
            self.content
                .delete_comment(&mut tx, viewer.user_id(), comment_id)
                .await?
        })
    }

    // Feed and likes

    pub async fn compute_feed(
        &self,
        viewer: &ViewerContext,
        page: Page,
    ) -> AppResult<Vec<FeedPost>> {
        let page = self.page(page);
        transactional!(self, "compute_feed", |tx| {
            self.feed.compute_feed(&mut tx, viewer.user_id(), page).await?
        })
    }

    pub async fn toggle_like(
        &self,
        viewer: &ViewerContext,
        post_id: PostId,
    ) -> AppResult<LikeToggle> {
        transactional!(self, "toggle_like", |tx| {
            self.likes.toggle(&mut tx, viewer.user_id(), post_id).await?
        })
    }

    pub async fn likes_count(&self, post_id: PostId) -> AppResult<u64> {
        transactional!(self, "likes_count", |tx| {
            self.likes.likes_count(&mut tx, post_id).await?
        })
    }

    // Notifications

    pub async fn list_notifications(
        &self,
        viewer: &ViewerContext,
        page: Page,
    ) -> AppResult<Vec<Notification>> {
        let page = self.page(page);
        transactional!(self, "list_notifications", |tx| {
            self.notifications.list(&mut tx, viewer.user_id(), page).await?
        })
    }

    pub async fn mark_all_read(&self, viewer: &ViewerContext) -> AppResult<u64> {
        transactional!(self, "mark_all_read", |tx| {
            self.notifications
                .mark_all_read(&mut tx, viewer.user_id())
                .await?
        })
    }

    pub async fn unread_count(&self, viewer: &ViewerContext) -> AppResult<u64> {
        transactional!(self, "unread_count", |tx| {
            self.notifications
                .unread_count(&mut tx, viewer.user_id())
                .await?
        })
    }

    // Conversations

    pub async fn create_conversation(
        &self,
        viewer: &ViewerContext,
        participant_ids: &[UserId],
        name: Option<&str>,
    ) -> AppResult<Conversation> {
        transactional!(self, "create_conversation", |tx| {
            self.conversations
                .create_conversation(&mut tx, viewer.user_id(), participant_ids, name)
                .await?
        })
    }

    pub async fn post_message(
        &self,
        viewer: &ViewerContext,
        conversation_id: ConversationId,
        content: &str,
    ) -> AppResult<Message> {
        transactional!(self, "post_message", |tx| {
            self.conversations
                .post_message(&mut tx, conversation_id, viewer.user_id(), content)
                .await?
        })
    }

    pub async fn list_messages(
        &self,
        viewer: &ViewerContext,
        conversation_id: ConversationId,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        let page = self.page(page);
        transactional!(self, "list_messages", |tx| {
            self.conversations
                .list_messages(&mut tx, conversation_id, viewer.user_id(), page)
                .await?
        })
    }

    pub async fn get_conversation(
        &self,
        viewer: &ViewerContext,
        conversation_id: ConversationId,
    ) -> AppResult<Conversation> {
        transactional!(self, "get_conversation", |tx| {
            self.conversations
                .get_conversation(&mut tx, conversation_id, viewer.user_id())
                .await?
        })
    }

    pub async fn list_conversations(&self, viewer: &ViewerContext) -> AppResult<Vec<Conversation>> {
        transactional!(self, "list_conversations", |tx| {
            self.conversations
                .list_conversations(&mut tx, viewer.user_id())
                .await?
        })
    }

    pub async fn add_participant(
        &self,
        viewer: &ViewerContext,
        conversation_id: ConversationId,
        new_participant: &UserId,
    ) -> AppResult<Conversation> {
        transactional!(self, "add_participant", |tx| {
            self.conversations
                .add_participant(&mut tx, conversation_id, viewer.user_id(), new_participant)
                .await?
        })
    }

    // Groups

    pub async fn create_group(
        &self,
        viewer: &ViewerContext,
        name: &str,
        description: Option<&str>,
        privacy: GroupPrivacy,
    ) -> AppResult<Group> {
        transactional!(self, "create_group", |tx| {
            self.groups
                .create_group(&mut tx, viewer.user_id(), name, description, privacy)
                .await?
        })
    }

    pub async fn get_group(&self, group_id: GroupId) -> AppResult<Group> {
        transactional!(self, "get_group", |tx| {
            self.groups.get_group(&mut tx, group_id).await?
        })
    }

    pub async fn list_groups(&self, page: Page) -> AppResult<Vec<Group>> {
        let page = self.page(page);
        transactional!(self, "list_groups", |tx| {
            self.groups.list_groups(&mut tx, page).await?
        })
    }

    pub async fn join_group(
        &self,
        viewer: &ViewerContext,
        group_id: GroupId,
    ) -> AppResult<GroupMember> {
        transactional!(self, "join_group", |tx| {
            self.groups
                .join_group(&mut tx, group_id, viewer.user_id())
                .await?
        })
    }

    pub async fn list_group_members(&self, group_id: GroupId) -> AppResult<Vec<GroupMember>> {
        transactional!(self, "list_group_members", |tx| {
            self.groups.list_members(&mut tx, group_id).await?
        })
    }

    pub async fn create_group_post(
        &self,
        viewer: &ViewerContext,
        group_id: GroupId,
        caption: Option<&str>,
        image: Option<&str>,
    ) -> AppResult<GroupPost> {
        transactional!(self, "create_group_post", |tx| {
            self.groups
                .create_post(&mut tx, group_id, viewer.user_id(), caption, image)
                .await?
        })
    }

    pub async fn list_group_posts(
        &self,
        group_id: GroupId,
        page: Page,
    ) -> AppResult<Vec<GroupPost>> {
        let page = self.page(page);
        transactional!(self, "list_group_posts", |tx| {
            self.groups.list_posts(&mut tx, group_id, page).await?
        })
    }
}
