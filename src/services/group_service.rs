// Group Service - membership graph and member-only group timelines

use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{GroupId, GroupPostId, Page, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, StoreTransaction};
use crate::infrastructure::id_generator::IdGenerator;
use crate::models::content::new_post_fields;
use crate::models::{
    now_millis_precision, Group, GroupMember, GroupPost, GroupPrivacy, GroupRole,
};

#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn EntityStore>,
    ids: Arc<IdGenerator>,
}

impl GroupService {
    pub fn new(store: Arc<dyn EntityStore>, ids: Arc<IdGenerator>) -> Self {
        Self { store, ids }
    }

    /// The creator joins as the group's admin
    pub async fn create_group(
        &self,
        tx: &mut StoreTransaction,
        creator: &UserId,
        name: &str,
        description: Option<&str>,
        privacy: GroupPrivacy,
    ) -> AppResult<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Group name is empty".to_string()));
        }

        let group = Group {
            id: GroupId::new(self.ids.next_id()),
            name: name.to_string(),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            privacy,
            creator: creator.clone(),
            created_at: now_millis_precision(),
        };
        self.store.insert_group(tx, &group).await?;
        info!("Group {} '{}' created by {}", group.id, group.name, creator);
        Ok(group)
    }

    pub async fn get_group(
        &self,
        tx: &mut StoreTransaction,
        group_id: GroupId,
    ) -> AppResult<Group> {
        self.store
            .get_group(tx, group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", group_id)))
    }

    pub async fn list_groups(
        &self,
        tx: &mut StoreTransaction,
        page: Page,
    ) -> AppResult<Vec<Group>> {
        self.store.list_groups(tx, page).await
    }

    /// Idempotent: an existing membership is returned unchanged, role included
    pub async fn join_group(
        &self,
        tx: &mut StoreTransaction,
        group_id: GroupId,
        user: &UserId,
    ) -> AppResult<GroupMember> {
        let member = GroupMember {
            group_id,
            user: user.clone(),
            role: GroupRole::Member,
            joined_at: now_millis_precision(),
        };

        if self.store.insert_group_member(tx, &member).await? {
            if !self.store.user_exists(tx, user).await? {
                return Err(AppError::NotFound(format!("User {} not found", user)));
            }
            info!("{} joined group {}", user, group_id);
            return Ok(member);
        }

        match self.store.get_group_member(tx, group_id, user).await? {
            Some(existing) => {
                debug!("{} is already a member of group {}", user, group_id);
                Ok(existing)
            }
            None => Err(AppError::NotFound(format!("Group {} not found", group_id))),
        }
    }

    pub async fn list_members(
        &self,
        tx: &mut StoreTransaction,
        group_id: GroupId,
    ) -> AppResult<Vec<GroupMember>> {
        self.ensure_exists(tx, group_id).await?;
        self.store.list_group_members(tx, group_id).await
    }

    /// Only members may post; the membership check is part of the insert
    pub async fn create_post(
        &self,
        tx: &mut StoreTransaction,
        group_id: GroupId,
        author: &UserId,
        caption: Option<&str>,
        image: Option<&str>,
    ) -> AppResult<GroupPost> {
        let (caption, image) = new_post_fields(caption, image)?;
        let post = GroupPost {
            id: GroupPostId::new(self.ids.next_id()),
            group_id,
            author: author.clone(),
            caption,
            image,
            created_at: now_millis_precision(),
        };

        if self.store.insert_group_post_if_member(tx, &post).await? {
            info!("Group post {} created in group {} by {}", post.id, group_id, author);
            return Ok(post);
        }

        self.ensure_exists(tx, group_id).await?;
        Err(AppError::Unauthorized(format!(
            "{} must be a member to post in group {}",
            author, group_id
        )))
    }

    /// Newest first
    pub async fn list_posts(
        &self,
        tx: &mut StoreTransaction,
        group_id: GroupId,
        page: Page,
    ) -> AppResult<Vec<GroupPost>> {
        self.ensure_exists(tx, group_id).await?;
        self.store.list_group_posts(tx, group_id, page).await
    }

    async fn ensure_exists(&self, tx: &mut StoreTransaction, group_id: GroupId) -> AppResult<()> {
        if self.store.group_exists(tx, group_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Group {} not found", group_id)))
        }
    }
}
