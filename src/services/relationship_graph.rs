// Relationship Graph - friend request state machine and follow edges
//
// Friendship is stored as directed request rows; an accepted row in either
// direction makes both parties friends. Requests in opposite directions are
// independent rows and are never merged.

use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{FriendRequestId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, StoreTransaction};
use crate::infrastructure::id_generator::IdGenerator;
use crate::models::{
    now_millis_precision, Follow, FriendRequest, FriendRequestDecision, FriendRequestStatus,
    NotificationKind, UserSummary,
};
use crate::services::notification_engine::NotificationEngine;

#[derive(Clone)]
pub struct RelationshipGraph {
    store: Arc<dyn EntityStore>,
    ids: Arc<IdGenerator>,
    notifications: NotificationEngine,
}

impl RelationshipGraph {
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

    pub async fn send_friend_request(
        &self,
        tx: &mut StoreTransaction,
        sender: &UserId,
        receiver: &UserId,
    ) -> AppResult<FriendRequest> {
        if sender == receiver {
            return Err(AppError::SelfReference(format!(
                "User {} cannot send a friend request to themselves",
                sender
            )));
        }

        let request = FriendRequest {
            id: FriendRequestId::new(self.ids.next_id()),
            sender: sender.clone(),
            receiver: receiver.clone(),
            status: FriendRequestStatus::Pending,
            created_at: now_millis_precision(),
        };

        // The uniqueness constraint on (sender, receiver) decides duplicates
        if !self.store.insert_friend_request(tx, &request).await? {
            return Err(AppError::DuplicateRequest(format!(
                "Friend request from {} to {} already exists",
                sender, receiver
            )));
        }
        if !self.store.user_exists(tx, receiver).await? {
            return Err(AppError::NotFound(format!("User {} not found", receiver)));
        }

        self.notifications
            .notify(tx, receiver, sender, NotificationKind::FriendRequest, None)
            .await?;
        info!("Friend request {} sent: {} -> {}", request.id, sender, receiver);
        Ok(request)
    }

    pub async fn respond_to_friend_request(
        &self,
        tx: &mut StoreTransaction,
        request_id: FriendRequestId,
        actor: &UserId,
        decision: FriendRequestDecision,
    ) -> AppResult<FriendRequest> {
        let target = decision.target_status();
        let moved = self
            .store
            .transition_friend_request(tx, request_id, actor, FriendRequestStatus::Pending, target)
            .await?;

        let request = self
            .store
            .get_friend_request(tx, request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Friend request {} not found", request_id)))?;

        if moved {
            info!(
                "Friend request {} {} by {}",
                request_id, request.status, actor
            );
            return Ok(request);
        }

        if &request.receiver != actor {
            return Err(AppError::Unauthorized(format!(
                "Only the receiver may answer friend request {}",
                request_id
            )));
        }
        if request.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "Friend request {} is already {}",
                request_id, request.status
            )));
        }
        Err(AppError::Internal(format!(
            "Friend request {} is still {} but could not be moved",
            request_id, request.status
        )))
    }

    /// Idempotent: an existing edge is returned unchanged and nobody is notified
    pub async fn follow(
        &self,
        tx: &mut StoreTransaction,
        follower: &UserId,
        following: &UserId,
    ) -> AppResult<Follow> {
        if follower == following {
            return Err(AppError::SelfReference(format!(
                "User {} cannot follow themselves",
                follower
            )));
        }

        let edge = Follow {
            follower: follower.clone(),
            following: following.clone(),
            created_at: now_millis_precision(),
        };

        if !self.store.insert_follow(tx, &edge).await? {
            debug!("{} already follows {}", follower, following);
            return self
                .store
                .get_follow(tx, follower, following)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "Follow edge {} -> {} vanished",
                        follower, following
                    ))
                });
        }
        if !self.store.user_exists(tx, following).await? {
            return Err(AppError::NotFound(format!("User {} not found", following)));
        }

        self.notifications
            .notify(tx, following, follower, NotificationKind::Follow, None)
            .await?;
        info!("{} now follows {}", follower, following);
        Ok(edge)
    }

    /// Returns whether an edge was removed; a missing edge is not an error
    pub async fn unfollow(
        &self,
        tx: &mut StoreTransaction,
        follower: &UserId,
        following: &UserId,
    ) -> AppResult<bool> {
        let removed = self.store.delete_follow(tx, follower, following).await?;
        if removed {
            info!("{} unfollowed {}", follower, following);
        }
        Ok(removed)
    }

    pub async fn friend_ids(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<UserId>> {
        self.store.accepted_friend_ids(tx, user).await
    }

    pub async fn following_ids(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<UserId>> {
        self.store.following_ids(tx, user).await
    }

    pub async fn list_friends(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<UserSummary>> {
        let ids = self.friend_ids(tx, user).await?;
        self.store.get_users(tx, &ids).await
    }

    pub async fn list_following(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<UserSummary>> {
        let ids = self.store.following_ids(tx, user).await?;
        self.store.get_users(tx, &ids).await
    }

    pub async fn list_followers(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<UserSummary>> {
        let ids = self.store.follower_ids(tx, user).await?;
        self.store.get_users(tx, &ids).await
    }

    /// Pending requests addressed to `user`, newest first
    pub async fn pending_requests(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<FriendRequest>> {
        self.store.pending_requests_for(tx, user).await
    }
}
