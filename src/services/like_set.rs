// Like Set - (user, post) membership with an atomic toggle

use std::sync::Arc;
use tracing::info;

use crate::core::{PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, StoreTransaction};
use crate::models::{now_millis_precision, to_millis, LikeOutcome, LikeToggle, NotificationKind};
use crate::services::notification_engine::NotificationEngine;

#[derive(Clone)]
pub struct LikeSet {
    store: Arc<dyn EntityStore>,
    notifications: NotificationEngine,
}

impl LikeSet {
    pub fn new(store: Arc<dyn EntityStore>, notifications: NotificationEngine) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Flip membership of (user, post) and report the resulting state.
    ///
    /// The delete runs first so the transaction holds the write lock before
    /// anything is decided; the (user, post) primary key rules out a second
    /// row even if two toggles race.
    pub async fn toggle(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
        post_id: PostId,
    ) -> AppResult<LikeToggle> {
        if self.store.delete_like(tx, user, post_id).await? {
            let likes_count = self.store.count_likes(tx, post_id).await?;
            info!("{} unliked post {} ({} likes)", user, post_id, likes_count);
            return Ok(LikeToggle {
                outcome: LikeOutcome::Unliked,
                likes_count,
            });
        }

        let post = self
            .store
            .get_post(tx, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;

        let inserted = self
            .store
            .insert_like(tx, user, post_id, to_millis(now_millis_precision()))
            .await?;
        if inserted {
            self.notifications
                .notify(tx, &post.author, user, NotificationKind::Like, Some(post_id))
                .await?;
        }

        let likes_count = self.store.count_likes(tx, post_id).await?;
        info!("{} liked post {} ({} likes)", user, post_id, likes_count);
        Ok(LikeToggle {
            outcome: LikeOutcome::Liked,
            likes_count,
        })
    }

    pub async fn likes_count(&self, tx: &mut StoreTransaction, post_id: PostId) -> AppResult<u64> {
        self.store.count_likes(tx, post_id).await
    }
}
