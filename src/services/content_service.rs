// Content Service - posts and comments, the subjects of likes and the feed

use std::sync::Arc;
use tracing::info;

use crate::core::{CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, StoreTransaction};
use crate::infrastructure::id_generator::IdGenerator;
use crate::models::content::new_post_fields;
use crate::models::{now_millis_precision, Comment, NotificationKind, Post, PostPatch};
use crate::services::authorization::{can_delete_comment, can_modify_post};
use crate::services::notification_engine::NotificationEngine;

#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn EntityStore>,
    ids: Arc<IdGenerator>,
    notifications: NotificationEngine,
}

impl ContentService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        ids: Arc<IdGenerator>,
        notifications: NotificationEngine,
    ) -> Self {
        Self {
            store,
            ids,
            notifications,
        }
    }

    pub async fn create_post(
        &self,
        tx: &mut StoreTransaction,
        author: &UserId,
        caption: Option<&str>,
        image: Option<&str>,
    ) -> AppResult<Post> {
        let (caption, image) = new_post_fields(caption, image)?;
        let post = Post {
            id: PostId::new(self.ids.next_id()),
            author: author.clone(),
            caption,
            image,
            created_at: now_millis_precision(),
        };
        self.store.insert_post(tx, &post).await?;
        info!("Post {} created by {}", post.id, author);
        Ok(post)
    }

    async fn owned_post(
        &self,
        tx: &mut StoreTransaction,
        actor: &UserId,
        post_id: PostId,
    ) -> AppResult<Post> {
        let post = self
            .store
            .get_post(tx, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;
        if !can_modify_post(actor, &post) {
            return Err(AppError::Unauthorized(format!(
                "{} is not the author of post {}",
                actor, post_id
            )));
        }
        Ok(post)
    }

    pub async fn update_post(
        &self,
        tx: &mut StoreTransaction,
        actor: &UserId,
        post_id: PostId,
        patch: &PostPatch,
    ) -> AppResult<Post> {
        let post = self.owned_post(tx, actor, post_id).await?;
        if patch.is_empty() {
            return Ok(post);
        }
        let updated = patch.apply_to(&post)?;
        self.store.update_post(tx, &updated).await?;
        info!("Post {} updated by {}", post_id, actor);
        Ok(updated)
    }

    pub async fn delete_post(
        &self,
        tx: &mut StoreTransaction,
        actor: &UserId,
        post_id: PostId,
    ) -> AppResult<()> {
        self.owned_post(tx, actor, post_id).await?;
        self.store.delete_post(tx, post_id).await?;
        info!("Post {} deleted by {}", post_id, actor);
        Ok(())
    }

    /// Notifies the post author (unless they comment on their own post)
    pub async fn create_comment(
        &self,
        tx: &mut StoreTransaction,
        author: &UserId,
        post_id: PostId,
        content: &str,
    ) -> AppResult<Comment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("Comment content is empty".to_string()));
        }

        let comment = Comment {
            id: CommentId::new(self.ids.next_id()),
            post_id,
            author: author.clone(),
            content: content.to_string(),
            created_at: now_millis_precision(),
        };
        self.store.insert_comment(tx, &comment).await?;

        let post = self
            .store
            .get_post(tx, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;

        self.notifications
            .notify(tx, &post.author, author, NotificationKind::Comment, Some(post_id))
            .await?;
        info!("Comment {} on post {} by {}", comment.id, post_id, author);
        Ok(comment)
    }

    /// Oldest first
    pub async fn list_comments(
        &self,
        tx: &mut StoreTransaction,
        post_id: PostId,
    ) -> AppResult<Vec<Comment>> {
        if self.store.get_post(tx, post_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }
        self.store.list_comments(tx, post_id).await
    }

    pub async fn delete_comment(
        &self,
        tx: &mut StoreTransaction,
        actor: &UserId,
        comment_id: CommentId,
    ) -> AppResult<()> {
        let comment = self
            .store
            .get_comment(tx, comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", comment_id)))?;
        let post = self.store.get_post(tx, comment.post_id).await?;

        if !can_delete_comment(actor, &comment, post.as_ref().map(|p| &p.author)) {
            return Err(AppError::Unauthorized(format!(
                "{} may not delete comment {}",
                actor, comment_id
            )));
        }

        self.store.delete_comment(tx, comment_id).await?;
        info!("Comment {} deleted by {}", comment_id, actor);
        Ok(())
    }
}
