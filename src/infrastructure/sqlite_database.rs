use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::{
    CommentId, ConversationId, FriendRequestId, GroupId, GroupPostId, MessageId, NotificationId,
    Page, PostId, UserId,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, StoreTransaction};
use crate::models::{
    from_millis, to_millis, Comment, Conversation, FeedPost, Follow, FriendRequest,
    FriendRequestStatus, Group, GroupMember, GroupPost, GroupPrivacy, GroupRole, Message,
    Notification, NotificationKind, Post, UserSummary,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        email TEXT,
        time_updated INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS friend_requests (
        id INTEGER PRIMARY KEY,
        sender_id TEXT NOT NULL,
        receiver_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        time_created INTEGER NOT NULL,
        UNIQUE (sender_id, receiver_id),
        CHECK (sender_id <> receiver_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver ON friend_requests(receiver_id, status)",
    r#"
    CREATE TABLE IF NOT EXISTS follows (
        follower_id TEXT NOT NULL,
        following_id TEXT NOT NULL,
        time_created INTEGER NOT NULL,
        PRIMARY KEY (follower_id, following_id),
        CHECK (follower_id <> following_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id)",
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY,
        author_id TEXT NOT NULL,
        caption TEXT,
        image TEXT,
        time_created INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_author_time ON posts(author_id, time_created DESC, id DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS likes (
        user_id TEXT NOT NULL,
        post_id INTEGER NOT NULL,
        time_created INTEGER NOT NULL,
        PRIMARY KEY (user_id, post_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id)",
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY,
        post_id INTEGER NOT NULL,
        author_id TEXT NOT NULL,
        content TEXT NOT NULL,
        time_created INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_comments_post_time ON comments(post_id, time_created)",
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY,
        recipient_id TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        post_id INTEGER,
        is_read INTEGER NOT NULL DEFAULT 0,
        time_created INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_notifications_recipient_time ON notifications(recipient_id, time_created DESC)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_subject ON notifications(recipient_id, actor_id, kind, post_id)",
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY,
        name TEXT,
        time_created INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversation_participants (
        conversation_id INTEGER NOT NULL,
        user_id TEXT NOT NULL,
        time_joined INTEGER NOT NULL,
        PRIMARY KEY (conversation_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_participants_user ON conversation_participants(user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY,
        conversation_id INTEGER NOT NULL,
        sender_id TEXT NOT NULL,
        content TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        time_created INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation_time ON messages(conversation_id, time_created, id)",
    r#"
    CREATE TABLE IF NOT EXISTS social_groups (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        privacy TEXT NOT NULL DEFAULT 'public',
        creator_id TEXT NOT NULL,
        time_created INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_members (
        group_id INTEGER NOT NULL,
        user_id TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'member',
        time_joined INTEGER NOT NULL,
        PRIMARY KEY (group_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_posts (
        id INTEGER PRIMARY KEY,
        group_id INTEGER NOT NULL,
        author_id TEXT NOT NULL,
        caption TEXT,
        image TEXT,
        time_created INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_group_posts_group_time ON group_posts(group_id, time_created DESC, id DESC)",
];

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// SQLite implementation of the entity store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a pool for the configured database and create the schema
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| AppError::StoreUnavailable(format!("Invalid database url: {}", e)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        // Every connection to `:memory:` is its own database, so keep exactly one alive
        let pool_options = if is_in_memory(&config.url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to connect to {}: {}", config.url, e))
            })?;

        let store = Self { pool };
        store.initialize().await?;
        info!("Entity store ready at {}", config.url);
        Ok(store)
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect(&DatabaseConfig::default()).await
    }

    /// Create tables and indexes; safe to run repeatedly
    pub async fn initialize(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await.map_err(|e| {
                AppError::Internal(format!("Failed to initialize schema: {}", e))
            })?;
        }
        debug!("Schema initialized ({} statements)", SCHEMA.len());
        Ok(())
    }

    /// Health check to verify database connectivity
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

fn user_id(row: &SqliteRow, column: &str) -> AppResult<UserId> {
    Ok(UserId::new(row.try_get::<String, _>(column)?))
}

fn friend_request_from_row(row: &SqliteRow) -> AppResult<FriendRequest> {
    Ok(FriendRequest {
        id: FriendRequestId::new(row.try_get("id")?),
        sender: user_id(row, "sender_id")?,
        receiver: user_id(row, "receiver_id")?,
        status: FriendRequestStatus::parse(&row.try_get::<String, _>("status")?)?,
        created_at: from_millis(row.try_get("time_created")?)?,
    })
}

fn follow_from_row(row: &SqliteRow) -> AppResult<Follow> {
    Ok(Follow {
        follower: user_id(row, "follower_id")?,
        following: user_id(row, "following_id")?,
        created_at: from_millis(row.try_get("time_created")?)?,
    })
}

fn post_from_row(row: &SqliteRow) -> AppResult<Post> {
    Ok(Post {
        id: PostId::new(row.try_get("id")?),
        author: user_id(row, "author_id")?,
        caption: row.try_get("caption")?,
        image: row.try_get("image")?,
        created_at: from_millis(row.try_get("time_created")?)?,
    })
}

fn feed_post_from_row(row: &SqliteRow) -> AppResult<FeedPost> {
    Ok(FeedPost {
        post: post_from_row(row)?,
        likes_count: row.try_get::<i64, _>("likes_count")?.max(0) as u64,
        is_liked: row.try_get::<i64, _>("is_liked")? != 0,
    })
}

fn comment_from_row(row: &SqliteRow) -> AppResult<Comment> {
    Ok(Comment {
        id: CommentId::new(row.try_get("id")?),
        post_id: PostId::new(row.try_get("post_id")?),
        author: user_id(row, "author_id")?,
        content: row.try_get("content")?,
        created_at: from_millis(row.try_get("time_created")?)?,
    })
}

fn notification_from_row(row: &SqliteRow) -> AppResult<Notification> {
    Ok(Notification {
        id: NotificationId::new(row.try_get("id")?),
        recipient: user_id(row, "recipient_id")?,
        actor: user_id(row, "actor_id")?,
        kind: NotificationKind::parse(&row.try_get::<String, _>("kind")?)?,
        post_id: row.try_get::<Option<i64>, _>("post_id")?.map(PostId::new),
        is_read: row.try_get::<i64, _>("is_read")? != 0,
        created_at: from_millis(row.try_get("time_created")?)?,
    })
}

fn message_from_row(row: &SqliteRow) -> AppResult<Message> {
    Ok(Message {
        id: MessageId::new(row.try_get("id")?),
        conversation_id: ConversationId::new(row.try_get("conversation_id")?),
        sender: user_id(row, "sender_id")?,
        content: row.try_get("content")?,
        created_at: from_millis(row.try_get("time_created")?)?,
        is_read: row.try_get::<i64, _>("is_read")? != 0,
    })
}

fn group_from_row(row: &SqliteRow) -> AppResult<Group> {
    Ok(Group {
        id: GroupId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        privacy: GroupPrivacy::parse(&row.try_get::<String, _>("privacy")?)?,
        creator: user_id(row, "creator_id")?,
        created_at: from_millis(row.try_get("time_created")?)?,
    })
}

fn group_member_from_row(row: &SqliteRow) -> AppResult<GroupMember> {
    Ok(GroupMember {
        group_id: GroupId::new(row.try_get("group_id")?),
        user: user_id(row, "user_id")?,
        role: GroupRole::parse(&row.try_get::<String, _>("role")?)?,
        joined_at: from_millis(row.try_get("time_joined")?)?,
    })
}

fn group_post_from_row(row: &SqliteRow) -> AppResult<GroupPost> {
    Ok(GroupPost {
        id: GroupPostId::new(row.try_get("id")?),
        group_id: GroupId::new(row.try_get("group_id")?),
        author: user_id(row, "author_id")?,
        caption: row.try_get("caption")?,
        image: row.try_get("image")?,
        created_at: from_millis(row.try_get("time_created")?)?,
    })
}

const FEED_POST_COLUMNS: &str = "SELECT p.id, p.author_id, p.caption, p.image, p.time_created, \
     (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS likes_count, \
     EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ";

const NOTIFICATION_COLUMNS: &str =
    "SELECT id, recipient_id, actor_id, kind, post_id, is_read, time_created FROM notifications";

#[async_trait]
impl EntityStore for SqliteStore {
    async fn begin_transaction(&self) -> AppResult<StoreTransaction> {
        let tx = self.pool.begin().await.map_err(|e| {
            let err = AppError::from(e);
            tracing::warn!("Failed to begin transaction: {}", err);
            err
        })?;
        Ok(StoreTransaction::new_sqlite(tx))
    }

    async fn upsert_user(
        &self,
        tx: &mut StoreTransaction,
        id: &UserId,
        username: &str,
        email: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, time_updated) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET username = excluded.username, email = excluded.email, \
             time_updated = excluded.time_updated",
        )
        .bind(id.as_str())
        .bind(username)
        .bind(email)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(())
    }

    async fn user_exists(&self, tx: &mut StoreTransaction, id: &UserId) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(tx.as_sqlite_mut())
            .await?;
        Ok(row.is_some())
    }

    async fn get_users(
        &self,
        tx: &mut StoreTransaction,
        ids: &[UserId],
    ) -> AppResult<Vec<UserSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id, username FROM users WHERE id IN (");
        let mut separated = qb.separated(",");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        qb.push(")");

        let rows = qb.build().fetch_all(tx.as_sqlite_mut()).await?;
        let mut known = BTreeMap::new();
        for row in rows {
            known.insert(user_id(&row, "id")?, row.try_get::<String, _>("username")?);
        }

        // Users without a mirror row are still reported, just without a name
        let mut summaries: Vec<UserSummary> = ids
            .iter()
            .map(|id| UserSummary {
                id: id.clone(),
                username: known.get(id).cloned(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries.dedup_by(|a, b| a.id == b.id);
        Ok(summaries)
    }

    async fn insert_friend_request(
        &self,
        tx: &mut StoreTransaction,
        request: &FriendRequest,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO friend_requests (id, sender_id, receiver_id, status, time_created) \
             VALUES (?, ?, ?, ?, ?) ON CONFLICT(sender_id, receiver_id) DO NOTHING",
        )
        .bind(request.id.value())
        .bind(request.sender.as_str())
        .bind(request.receiver.as_str())
        .bind(request.status.as_str())
        .bind(to_millis(request.created_at))
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_friend_request(
        &self,
        tx: &mut StoreTransaction,
        id: FriendRequestId,
    ) -> AppResult<Option<FriendRequest>> {
        let row = sqlx::query(
            "SELECT id, sender_id, receiver_id, status, time_created FROM friend_requests WHERE id = ?",
        )
        .bind(id.value())
        .fetch_optional(tx.as_sqlite_mut())
        .await?;
        row.as_ref().map(friend_request_from_row).transpose()
    }

    async fn transition_friend_request(
        &self,
        tx: &mut StoreTransaction,
        id: FriendRequestId,
        receiver: &UserId,
        from: FriendRequestStatus,
        to: FriendRequestStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE friend_requests SET status = ? WHERE id = ? AND receiver_id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(id.value())
        .bind(receiver.as_str())
        .bind(from.as_str())
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn accepted_friend_ids(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT receiver_id AS friend_id FROM friend_requests WHERE sender_id = ? AND status = 'accepted' \
             UNION \
             SELECT sender_id AS friend_id FROM friend_requests WHERE receiver_id = ? AND status = 'accepted' \
             ORDER BY friend_id",
        )
        .bind(user.as_str())
        .bind(user.as_str())
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(|row| user_id(row, "friend_id")).collect()
    }

    async fn pending_requests_for(
        &self,
        tx: &mut StoreTransaction,
        receiver: &UserId,
    ) -> AppResult<Vec<FriendRequest>> {
        let rows = sqlx::query(
            "SELECT id, sender_id, receiver_id, status, time_created FROM friend_requests \
             WHERE receiver_id = ? AND status = 'pending' ORDER BY time_created DESC, id DESC",
        )
        .bind(receiver.as_str())
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(friend_request_from_row).collect()
    }

    async fn insert_follow(&self, tx: &mut StoreTransaction, follow: &Follow) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO follows (follower_id, following_id, time_created) VALUES (?, ?, ?)",
        )
        .bind(follow.follower.as_str())
        .bind(follow.following.as_str())
        .bind(to_millis(follow.created_at))
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_follow(
        &self,
        tx: &mut StoreTransaction,
        follower: &UserId,
        following: &UserId,
    ) -> AppResult<Option<Follow>> {
        let row = sqlx::query(
            "SELECT follower_id, following_id, time_created FROM follows \
             WHERE follower_id = ? AND following_id = ?",
        )
        .bind(follower.as_str())
        .bind(following.as_str())
        .fetch_optional(tx.as_sqlite_mut())
        .await?;
        row.as_ref().map(follow_from_row).transpose()
    }

    async fn delete_follow(
        &self,
        tx: &mut StoreTransaction,
        follower: &UserId,
        following: &UserId,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND following_id = ?")
            .bind(follower.as_str())
            .bind(following.as_str())
            .execute(tx.as_sqlite_mut())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn following_ids(
        &self,
        tx: &mut StoreTransaction,
        follower: &UserId,
    ) -> AppResult<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT following_id FROM follows WHERE follower_id = ? ORDER BY following_id",
        )
        .bind(follower.as_str())
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(|row| user_id(row, "following_id")).collect()
    }

    async fn follower_ids(
        &self,
        tx: &mut StoreTransaction,
        following: &UserId,
    ) -> AppResult<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT follower_id FROM follows WHERE following_id = ? ORDER BY follower_id",
        )
        .bind(following.as_str())
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(|row| user_id(row, "follower_id")).collect()
    }

    async fn insert_post(&self, tx: &mut StoreTransaction, post: &Post) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO posts (id, author_id, caption, image, time_created) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(post.id.value())
        .bind(post.author.as_str())
        .bind(post.caption.as_deref())
        .bind(post.image.as_deref())
        .bind(to_millis(post.created_at))
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(())
    }

    async fn get_post(&self, tx: &mut StoreTransaction, id: PostId) -> AppResult<Option<Post>> {
        let row = sqlx::query(
            "SELECT id, author_id, caption, image, time_created FROM posts WHERE id = ?",
        )
        .bind(id.value())
        .fetch_optional(tx.as_sqlite_mut())
        .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn update_post(&self, tx: &mut StoreTransaction, post: &Post) -> AppResult<bool> {
        let result = sqlx::query("UPDATE posts SET caption = ?, image = ? WHERE id = ?")
            .bind(post.caption.as_deref())
            .bind(post.image.as_deref())
            .bind(post.id.value())
            .execute(tx.as_sqlite_mut())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_post(&self, tx: &mut StoreTransaction, id: PostId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id.value())
            .execute(tx.as_sqlite_mut())
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM likes WHERE post_id = ?")
            .bind(id.value())
            .execute(tx.as_sqlite_mut())
            .await?;
        sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(id.value())
            .execute(tx.as_sqlite_mut())
            .await?;
        sqlx::query("UPDATE notifications SET post_id = NULL WHERE post_id = ?")
            .bind(id.value())
            .execute(tx.as_sqlite_mut())
            .await?;
        Ok(true)
    }

    async fn posts_by_authors(
        &self,
        tx: &mut StoreTransaction,
        viewer: &UserId,
        authors: &BTreeSet<UserId>,
        page: Page,
    ) -> AppResult<Vec<FeedPost>> {
        if authors.is_empty() || page.limit == 0 {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(FEED_POST_COLUMNS);
        qb.push_bind(viewer.as_str());
        qb.push(") AS is_liked FROM posts p WHERE p.author_id IN (");
        let mut separated = qb.separated(",");
        for author in authors {
            separated.push_bind(author.as_str());
        }
        qb.push(") ORDER BY p.time_created DESC, p.id DESC LIMIT ");
        qb.push_bind(page.limit as i64);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset as i64);

        let rows = qb.build().fetch_all(tx.as_sqlite_mut()).await?;
        rows.iter().map(feed_post_from_row).collect()
    }

    async fn get_feed_post(
        &self,
        tx: &mut StoreTransaction,
        viewer: &UserId,
        id: PostId,
    ) -> AppResult<Option<FeedPost>> {
        let mut qb = QueryBuilder::<Sqlite>::new(FEED_POST_COLUMNS);
        qb.push_bind(viewer.as_str());
        qb.push(") AS is_liked FROM posts p WHERE p.id = ");
        qb.push_bind(id.value());

        let row = qb.build().fetch_optional(tx.as_sqlite_mut()).await?;
        row.as_ref().map(feed_post_from_row).transpose()
    }

    async fn insert_like(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
        post: PostId,
        created_at_millis: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO likes (user_id, post_id, time_created) VALUES (?, ?, ?)",
        )
        .bind(user.as_str())
        .bind(post.value())
        .bind(created_at_millis)
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_like(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
        post: PostId,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE user_id = ? AND post_id = ?")
            .bind(user.as_str())
            .bind(post.value())
            .execute(tx.as_sqlite_mut())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_likes(&self, tx: &mut StoreTransaction, post: PostId) -> AppResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM likes WHERE post_id = ?")
            .bind(post.value())
            .fetch_one(tx.as_sqlite_mut())
            .await?;
        Ok(row.try_get::<i64, _>("count")?.max(0) as u64)
    }

    async fn insert_comment(&self, tx: &mut StoreTransaction, comment: &Comment) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, post_id, author_id, content, time_created) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(comment.id.value())
        .bind(comment.post_id.value())
        .bind(comment.author.as_str())
        .bind(comment.content.as_str())
        .bind(to_millis(comment.created_at))
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(())
    }

    async fn get_comment(
        &self,
        tx: &mut StoreTransaction,
        id: CommentId,
    ) -> AppResult<Option<Comment>> {
        let row = sqlx::query(
            "SELECT id, post_id, author_id, content, time_created FROM comments WHERE id = ?",
        )
        .bind(id.value())
        .fetch_optional(tx.as_sqlite_mut())
        .await?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn list_comments(
        &self,
        tx: &mut StoreTransaction,
        post: PostId,
    ) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT id, post_id, author_id, content, time_created FROM comments \
             WHERE post_id = ? ORDER BY time_created ASC, id ASC",
        )
        .bind(post.value())
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn delete_comment(&self, tx: &mut StoreTransaction, id: CommentId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id.value())
            .execute(tx.as_sqlite_mut())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_notification(
        &self,
        tx: &mut StoreTransaction,
        notification: &Notification,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, actor_id, kind, post_id, is_read, time_created) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(notification.id.value())
        .bind(notification.recipient.as_str())
        .bind(notification.actor.as_str())
        .bind(notification.kind.as_str())
        .bind(notification.post_id.map(PostId::value))
        .bind(notification.is_read as i64)
        .bind(to_millis(notification.created_at))
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(())
    }

    async fn insert_notification_if_absent(
        &self,
        tx: &mut StoreTransaction,
        notification: &Notification,
    ) -> AppResult<bool> {
        let post_id = notification.post_id.map(PostId::value);
        let result = sqlx::query(
            "INSERT INTO notifications (id, recipient_id, actor_id, kind, post_id, is_read, time_created) \
             SELECT ?, ?, ?, ?, ?, ?, ? WHERE NOT EXISTS ( \
                 SELECT 1 FROM notifications \
                 WHERE recipient_id = ? AND actor_id = ? AND kind = ? AND post_id IS ?)",
        )
        .bind(notification.id.value())
        .bind(notification.recipient.as_str())
        .bind(notification.actor.as_str())
        .bind(notification.kind.as_str())
        .bind(post_id)
        .bind(notification.is_read as i64)
        .bind(to_millis(notification.created_at))
        .bind(notification.recipient.as_str())
        .bind(notification.actor.as_str())
        .bind(notification.kind.as_str())
        .bind(post_id)
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_notification(
        &self,
        tx: &mut StoreTransaction,
        recipient: &UserId,
        actor: &UserId,
        kind: NotificationKind,
        post: Option<PostId>,
    ) -> AppResult<Option<Notification>> {
        let row = sqlx::query(&format!(
            "{} WHERE recipient_id = ? AND actor_id = ? AND kind = ? AND post_id IS ? \
             ORDER BY time_created ASC, id ASC LIMIT 1",
            NOTIFICATION_COLUMNS
        ))
        .bind(recipient.as_str())
        .bind(actor.as_str())
        .bind(kind.as_str())
        .bind(post.map(PostId::value))
        .fetch_optional(tx.as_sqlite_mut())
        .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn mark_all_read(
        &self,
        tx: &mut StoreTransaction,
        recipient: &UserId,
    ) -> AppResult<u64> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0")
                .bind(recipient.as_str())
                .execute(tx.as_sqlite_mut())
                .await?;
        Ok(result.rows_affected())
    }

    async fn list_notifications(
        &self,
        tx: &mut StoreTransaction,
        recipient: &UserId,
        page: Page,
    ) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "{} WHERE recipient_id = ? ORDER BY time_created DESC, id DESC LIMIT ? OFFSET ?",
            NOTIFICATION_COLUMNS
        ))
        .bind(recipient.as_str())
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn unread_count(&self, tx: &mut StoreTransaction, recipient: &UserId) -> AppResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM notifications WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(recipient.as_str())
        .fetch_one(tx.as_sqlite_mut())
        .await?;
        Ok(row.try_get::<i64, _>("count")?.max(0) as u64)
    }

    async fn insert_conversation(
        &self,
        tx: &mut StoreTransaction,
        conversation: &Conversation,
    ) -> AppResult<()> {
        let created = to_millis(conversation.created_at);
        sqlx::query("INSERT INTO conversations (id, name, time_created) VALUES (?, ?, ?)")
            .bind(conversation.id.value())
            .bind(conversation.name.as_deref())
            .bind(created)
            .execute(tx.as_sqlite_mut())
            .await?;

        for participant in &conversation.participants {
            self.add_participant(tx, conversation.id, participant, created)
                .await?;
        }
        Ok(())
    }

    async fn add_participant(
        &self,
        tx: &mut StoreTransaction,
        conversation: ConversationId,
        user: &UserId,
        joined_at_millis: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, time_joined) \
             VALUES (?, ?, ?)",
        )
        .bind(conversation.value())
        .bind(user.as_str())
        .bind(joined_at_millis)
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_conversation(
        &self,
        tx: &mut StoreTransaction,
        id: ConversationId,
    ) -> AppResult<Option<Conversation>> {
        let row = sqlx::query("SELECT id, name, time_created FROM conversations WHERE id = ?")
            .bind(id.value())
            .fetch_optional(tx.as_sqlite_mut())
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let participants = sqlx::query(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = ?",
        )
        .bind(id.value())
        .fetch_all(tx.as_sqlite_mut())
        .await?
        .iter()
        .map(|row| user_id(row, "user_id"))
        .collect::<AppResult<BTreeSet<_>>>()?;

        Ok(Some(Conversation {
            id,
            name: row.try_get("name")?,
            participants,
            created_at: from_millis(row.try_get("time_created")?)?,
        }))
    }

    async fn conversation_exists(
        &self,
        tx: &mut StoreTransaction,
        id: ConversationId,
    ) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM conversations WHERE id = ?")
            .bind(id.value())
            .fetch_optional(tx.as_sqlite_mut())
            .await?;
        Ok(row.is_some())
    }

    async fn is_participant(
        &self,
        tx: &mut StoreTransaction,
        conversation: ConversationId,
        user: &UserId,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM conversation_participants WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation.value())
        .bind(user.as_str())
        .fetch_optional(tx.as_sqlite_mut())
        .await?;
        Ok(row.is_some())
    }

    async fn conversations_for(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT c.id, c.name, c.time_created, p.user_id FROM conversations c \
             JOIN conversation_participants p ON p.conversation_id = c.id \
             WHERE c.id IN (SELECT conversation_id FROM conversation_participants WHERE user_id = ?) \
             ORDER BY c.time_created DESC, c.id DESC",
        )
        .bind(user.as_str())
        .fetch_all(tx.as_sqlite_mut())
        .await?;

        let mut conversations: Vec<Conversation> = Vec::new();
        for row in &rows {
            let id = ConversationId::new(row.try_get("id")?);
            let participant = user_id(row, "user_id")?;
            match conversations.last_mut() {
                Some(current) if current.id == id => {
                    current.participants.insert(participant);
                }
                _ => conversations.push(Conversation {
                    id,
                    name: row.try_get("name")?,
                    participants: BTreeSet::from([participant]),
                    created_at: from_millis(row.try_get("time_created")?)?,
                }),
            }
        }
        Ok(conversations)
    }

    async fn insert_message_if_participant(
        &self,
        tx: &mut StoreTransaction,
        message: &Message,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, is_read, time_created) \
             SELECT ?, ?, ?, ?, ?, ? WHERE EXISTS ( \
                 SELECT 1 FROM conversation_participants WHERE conversation_id = ? AND user_id = ?)",
        )
        .bind(message.id.value())
        .bind(message.conversation_id.value())
        .bind(message.sender.as_str())
        .bind(message.content.as_str())
        .bind(message.is_read as i64)
        .bind(to_millis(message.created_at))
        .bind(message.conversation_id.value())
        .bind(message.sender.as_str())
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_messages(
        &self,
        tx: &mut StoreTransaction,
        conversation: ConversationId,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, is_read, time_created FROM messages \
             WHERE conversation_id = ? ORDER BY time_created ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(conversation.value())
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn insert_group(&self, tx: &mut StoreTransaction, group: &Group) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO social_groups (id, name, description, privacy, creator_id, time_created) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(group.id.value())
        .bind(group.name.as_str())
        .bind(group.description.as_deref())
        .bind(group.privacy.as_str())
        .bind(group.creator.as_str())
        .bind(to_millis(group.created_at))
        .execute(tx.as_sqlite_mut())
        .await?;

        let admin = GroupMember {
            group_id: group.id,
            user: group.creator.clone(),
            role: GroupRole::Admin,
            joined_at: group.created_at,
        };
        self.insert_group_member(tx, &admin).await?;
        Ok(())
    }

    async fn get_group(&self, tx: &mut StoreTransaction, id: GroupId) -> AppResult<Option<Group>> {
        let row = sqlx::query(
            "SELECT id, name, description, privacy, creator_id, time_created \
             FROM social_groups WHERE id = ?",
        )
        .bind(id.value())
        .fetch_optional(tx.as_sqlite_mut())
        .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn group_exists(&self, tx: &mut StoreTransaction, id: GroupId) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM social_groups WHERE id = ?")
            .bind(id.value())
            .fetch_optional(tx.as_sqlite_mut())
            .await?;
        Ok(row.is_some())
    }

    async fn list_groups(&self, tx: &mut StoreTransaction, page: Page) -> AppResult<Vec<Group>> {
        let rows = sqlx::query(
            "SELECT id, name, description, privacy, creator_id, time_created FROM social_groups \
             ORDER BY time_created DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(group_from_row).collect()
    }

    async fn insert_group_member(
        &self,
        tx: &mut StoreTransaction,
        member: &GroupMember,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, role, time_joined) \
             SELECT ?, ?, ?, ? WHERE EXISTS (SELECT 1 FROM social_groups WHERE id = ?)",
        )
        .bind(member.group_id.value())
        .bind(member.user.as_str())
        .bind(member.role.as_str())
        .bind(to_millis(member.joined_at))
        .bind(member.group_id.value())
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_group_member(
        &self,
        tx: &mut StoreTransaction,
        group: GroupId,
        user: &UserId,
    ) -> AppResult<Option<GroupMember>> {
        let row = sqlx::query(
            "SELECT group_id, user_id, role, time_joined FROM group_members \
             WHERE group_id = ? AND user_id = ?",
        )
        .bind(group.value())
        .bind(user.as_str())
        .fetch_optional(tx.as_sqlite_mut())
        .await?;
        row.as_ref().map(group_member_from_row).transpose()
    }

    async fn list_group_members(
        &self,
        tx: &mut StoreTransaction,
        group: GroupId,
    ) -> AppResult<Vec<GroupMember>> {
        let rows = sqlx::query(
            "SELECT group_id, user_id, role, time_joined FROM group_members \
             WHERE group_id = ? ORDER BY time_joined ASC, user_id ASC",
        )
        .bind(group.value())
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(group_member_from_row).collect()
    }

    async fn insert_group_post_if_member(
        &self,
        tx: &mut StoreTransaction,
        post: &GroupPost,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO group_posts (id, group_id, author_id, caption, image, time_created) \
             SELECT ?, ?, ?, ?, ?, ? WHERE EXISTS ( \
                 SELECT 1 FROM group_members WHERE group_id = ? AND user_id = ?)",
        )
        .bind(post.id.value())
        .bind(post.group_id.value())
        .bind(post.author.as_str())
        .bind(post.caption.as_deref())
        .bind(post.image.as_deref())
        .bind(to_millis(post.created_at))
        .bind(post.group_id.value())
        .bind(post.author.as_str())
        .execute(tx.as_sqlite_mut())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_group_posts(
        &self,
        tx: &mut StoreTransaction,
        group: GroupId,
        page: Page,
    ) -> AppResult<Vec<GroupPost>> {
        let rows = sqlx::query(
            "SELECT id, group_id, author_id, caption, image, time_created FROM group_posts \
             WHERE group_id = ? ORDER BY time_created DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(group.value())
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(tx.as_sqlite_mut())
        .await?;
        rows.iter().map(group_post_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post(id: i64, author: &str, millis: i64) -> Post {
        Post {
            id: PostId::new(id),
            author: UserId::from(author),
            caption: Some(format!("post {}", id)),
            image: None,
            created_at: Utc.timestamp_millis_opt(millis).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_posts_ordered_by_time_then_id() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let mut tx = store.begin_transaction().await.unwrap();
        for p in [
            post(1, "a", 1_000),
            post(2, "a", 2_000),
            post(3, "b", 2_000),
            post(4, "c", 3_000),
            post(5, "b", 500),
        ] {
            store.insert_post(&mut tx, &p).await.unwrap();
        }

        let authors = BTreeSet::from([UserId::from("a"), UserId::from("b")]);
        let viewer = UserId::from("a");
        let first = store
            .posts_by_authors(&mut tx, &viewer, &authors, Page::new(0, 2))
            .await
            .unwrap();
        let second = store
            .posts_by_authors(&mut tx, &viewer, &authors, Page::new(2, 2))
            .await
            .unwrap();

        let ids: Vec<i64> = first
            .iter()
            .chain(second.iter())
            .map(|p| p.post.id.value())
            .collect();
        assert_eq!(ids, vec![3, 2, 1, 5]);
    }

    #[tokio::test]
    async fn test_like_row_is_unique() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let mut tx = store.begin_transaction().await.unwrap();
        let user = UserId::from("u");
        store.insert_post(&mut tx, &post(1, "a", 1)).await.unwrap();

        assert!(store.insert_like(&mut tx, &user, PostId::new(1), 1).await.unwrap());
        assert!(!store.insert_like(&mut tx, &user, PostId::new(1), 2).await.unwrap());
        assert_eq!(store.count_likes(&mut tx, PostId::new(1)).await.unwrap(), 1);

        let viewed = store
            .get_feed_post(&mut tx, &user, PostId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert!(viewed.is_liked);
        assert_eq!(viewed.likes_count, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let mut tx = store.begin_transaction().await.unwrap();
        store.insert_post(&mut tx, &post(9, "a", 1)).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        assert!(store.get_post(&mut tx, PostId::new(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_notification_conditional_insert_matches_null_post() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let mut tx = store.begin_transaction().await.unwrap();
        let make = |id: i64| Notification {
            id: NotificationId::new(id),
            recipient: UserId::from("r"),
            actor: UserId::from("a"),
            kind: NotificationKind::Follow,
            post_id: None,
            is_read: false,
            created_at: Utc::now(),
        };

        assert!(store.insert_notification_if_absent(&mut tx, &make(1)).await.unwrap());
        assert!(!store.insert_notification_if_absent(&mut tx, &make(2)).await.unwrap());
        assert_eq!(store.unread_count(&mut tx, &UserId::from("r")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_group_membership_requires_group() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let mut tx = store.begin_transaction().await.unwrap();
        let member = |group: i64| GroupMember {
            group_id: GroupId::new(group),
            user: UserId::from("m"),
            role: GroupRole::Member,
            joined_at: Utc.timestamp_millis_opt(5).unwrap(),
        };

        assert!(!store.insert_group_member(&mut tx, &member(1)).await.unwrap());

        let group = Group {
            id: GroupId::new(1),
            name: "readers".to_string(),
            description: None,
            privacy: GroupPrivacy::Public,
            creator: UserId::from("c"),
            created_at: Utc.timestamp_millis_opt(1).unwrap(),
        };
        store.insert_group(&mut tx, &group).await.unwrap();
        assert!(store.insert_group_member(&mut tx, &member(1)).await.unwrap());
        assert!(!store.insert_group_member(&mut tx, &member(1)).await.unwrap());

        let members = store.list_group_members(&mut tx, GroupId::new(1)).await.unwrap();
        let roles: Vec<GroupRole> = members.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![GroupRole::Admin, GroupRole::Member]);
    }
}
