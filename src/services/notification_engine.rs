// Notification Engine - activity rows created as a side effect of graph,
// like and comment mutations, inside the triggering transaction

use std::sync::Arc;
use tracing::debug;

use crate::core::{Page, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, StoreTransaction};
use crate::infrastructure::id_generator::IdGenerator;
use crate::models::{now_millis_precision, Notification, NotificationKind};

/// How repeated triggers of the same kind are collapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Every trigger creates a new row
    None,
    /// One row per (recipient, actor, kind, post), read or unread
    PerSubject,
}

/// Per-kind dedup table. Adding a kind forces a decision here.
pub fn dedup_policy(kind: NotificationKind) -> DedupPolicy {
    match kind {
        NotificationKind::Like => DedupPolicy::PerSubject,
        NotificationKind::Comment => DedupPolicy::None,
        NotificationKind::FriendRequest => DedupPolicy::None,
        NotificationKind::Follow => DedupPolicy::None,
    }
}

#[derive(Clone)]
pub struct NotificationEngine {
    store: Arc<dyn EntityStore>,
    ids: Arc<IdGenerator>,
}

impl NotificationEngine {
    pub fn new(store: Arc<dyn EntityStore>, ids: Arc<IdGenerator>) -> Self {
        Self { store, ids }
    }

    /// Record that `actor` did something `recipient` should hear about.
    ///
    /// Returns None for self-actions, otherwise the created row or, when the
    /// kind dedups, the row that already covered this subject.
    pub async fn notify(
        &self,
        tx: &mut StoreTransaction,
        recipient: &UserId,
        actor: &UserId,
        kind: NotificationKind,
        post_id: Option<PostId>,
    ) -> AppResult<Option<Notification>> {
        if recipient == actor {
            return Ok(None);
        }

        let notification = Notification {
            id: self.ids.next_id().into(),
            recipient: recipient.clone(),
            actor: actor.clone(),
            kind,
            post_id,
            is_read: false,
            created_at: now_millis_precision(),
        };

        match dedup_policy(kind) {
            DedupPolicy::None => {
                self.store.insert_notification(tx, &notification).await?;
                debug!("Created {} notification for {} from {}", kind, recipient, actor);
                Ok(Some(notification))
            }
            DedupPolicy::PerSubject => {
                if self
                    .store
                    .insert_notification_if_absent(tx, &notification)
                    .await?
                {
                    debug!("Created {} notification for {} from {}", kind, recipient, actor);
                    return Ok(Some(notification));
                }
                let existing = self
                    .store
                    .find_notification(tx, recipient, actor, kind, post_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "Deduplicated {} notification for {} vanished",
                            kind, recipient
                        ))
                    })?;
                debug!(
                    "Reusing {} notification {} for {} from {}",
                    kind, existing.id, recipient, actor
                );
                Ok(Some(existing))
            }
        }
    }

    pub async fn mark_all_read(
        &self,
        tx: &mut StoreTransaction,
        recipient: &UserId,
    ) -> AppResult<u64> {
        self.store.mark_all_read(tx, recipient).await
    }

    /// Newest first
    pub async fn list(
        &self,
        tx: &mut StoreTransaction,
        recipient: &UserId,
        page: Page,
    ) -> AppResult<Vec<Notification>> {
        self.store.list_notifications(tx, recipient, page).await
    }

    pub async fn unread_count(
        &self,
        tx: &mut StoreTransaction,
        recipient: &UserId,
    ) -> AppResult<u64> {
        self.store.unread_count(tx, recipient).await
    }
}
