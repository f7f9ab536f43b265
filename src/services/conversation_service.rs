// Conversation Service - participant-gated direct and group messaging

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::core::{ConversationId, MessageId, Page, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, StoreTransaction};
use crate::infrastructure::id_generator::IdGenerator;
use crate::models::{now_millis_precision, to_millis, Conversation, Message};

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn EntityStore>,
    ids: Arc<IdGenerator>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn EntityStore>, ids: Arc<IdGenerator>) -> Self {
        Self { store, ids }
    }

    /// The creator is always a participant; duplicates collapse
    pub async fn create_conversation(
        &self,
        tx: &mut StoreTransaction,
        creator: &UserId,
        participant_ids: &[UserId],
        name: Option<&str>,
    ) -> AppResult<Conversation> {
        let mut participants: BTreeSet<UserId> = participant_ids.iter().cloned().collect();
        participants.insert(creator.clone());
        if participants.len() < 2 {
            return Err(AppError::EmptyParticipants(format!(
                "A conversation needs someone besides {}",
                creator
            )));
        }

        let conversation = Conversation {
            id: ConversationId::new(self.ids.next_id()),
            name: name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            participants,
            created_at: now_millis_precision(),
        };
        self.store.insert_conversation(tx, &conversation).await?;

        for participant in conversation.participants.iter().filter(|p| *p != creator) {
            if !self.store.user_exists(tx, participant).await? {
                return Err(AppError::NotFound(format!("User {} not found", participant)));
            }
        }

        info!(
            "Conversation {} created by {} with {} participants",
            conversation.id,
            creator,
            conversation.participants.len()
        );
        Ok(conversation)
    }

    /// Membership is checked by the insert itself, so a non-participant
    /// never leaves a row behind. Membership errors win over blank content.
    pub async fn post_message(
        &self,
        tx: &mut StoreTransaction,
        conversation_id: ConversationId,
        sender: &UserId,
        content: &str,
    ) -> AppResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            self.ensure_participant(tx, conversation_id, sender).await?;
            return Err(AppError::Validation("Message content is empty".to_string()));
        }

        let message = Message {
            id: MessageId::new(self.ids.next_id()),
            conversation_id,
            sender: sender.clone(),
            content: content.to_string(),
            created_at: now_millis_precision(),
            is_read: false,
        };

        if self.store.insert_message_if_participant(tx, &message).await? {
            info!(
                "Message {} posted to conversation {} by {}",
                message.id, conversation_id, sender
            );
            return Ok(message);
        }

        self.ensure_exists(tx, conversation_id).await?;
        Err(AppError::NotAParticipant(format!(
            "{} is not a participant of conversation {}",
            sender, conversation_id
        )))
    }

    /// Oldest first
    pub async fn list_messages(
        &self,
        tx: &mut StoreTransaction,
        conversation_id: ConversationId,
        viewer: &UserId,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        self.ensure_participant(tx, conversation_id, viewer).await?;
        self.store.list_messages(tx, conversation_id, page).await
    }

    pub async fn get_conversation(
        &self,
        tx: &mut StoreTransaction,
        conversation_id: ConversationId,
        viewer: &UserId,
    ) -> AppResult<Conversation> {
        let conversation = self
            .store
            .get_conversation(tx, conversation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Conversation {} not found", conversation_id))
            })?;
        if !conversation.is_participant(viewer) {
            return Err(AppError::NotAParticipant(format!(
                "{} is not a participant of conversation {}",
                viewer, conversation_id
            )));
        }
        Ok(conversation)
    }

    /// Newest first
    pub async fn list_conversations(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<Vec<Conversation>> {
        self.store.conversations_for(tx, user).await
    }

    /// An existing participant adds someone; adding a member twice is a no-op
    pub async fn add_participant(
        &self,
        tx: &mut StoreTransaction,
        conversation_id: ConversationId,
        actor: &UserId,
        new_participant: &UserId,
    ) -> AppResult<Conversation> {
        self.ensure_participant(tx, conversation_id, actor).await?;
        if !self.store.user_exists(tx, new_participant).await? {
            return Err(AppError::NotFound(format!("User {} not found", new_participant)));
        }

        let added = self
            .store
            .add_participant(
                tx,
                conversation_id,
                new_participant,
                to_millis(now_millis_precision()),
            )
            .await?;
        if added {
            info!(
                "{} added {} to conversation {}",
                actor, new_participant, conversation_id
            );
        }
        self.get_conversation(tx, conversation_id, actor).await
    }

    async fn ensure_exists(
        &self,
        tx: &mut StoreTransaction,
        conversation_id: ConversationId,
    ) -> AppResult<()> {
        if self.store.conversation_exists(tx, conversation_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )))
        }
    }

    async fn ensure_participant(
        &self,
        tx: &mut StoreTransaction,
        conversation_id: ConversationId,
        user: &UserId,
    ) -> AppResult<()> {
        self.ensure_exists(tx, conversation_id).await?;
        if self.store.is_participant(tx, conversation_id, user).await? {
            Ok(())
        } else {
            Err(AppError::NotAParticipant(format!(
                "{} is not a participant of conversation {}",
                user, conversation_id
            )))
        }
    }
}
