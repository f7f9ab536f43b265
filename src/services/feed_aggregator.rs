// Feed Aggregator - recency-ordered timeline over self, friends and followees

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::core::{Page, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, StoreTransaction};
use crate::models::FeedPost;
use crate::services::relationship_graph::RelationshipGraph;

#[derive(Clone)]
pub struct FeedAggregator {
    store: Arc<dyn EntityStore>,
    graph: RelationshipGraph,
}

impl FeedAggregator {
    pub fn new(store: Arc<dyn EntityStore>, graph: RelationshipGraph) -> Self {
        Self { store, graph }
    }

    /// {user} ∪ friends(user) ∪ followees(user)
    pub async fn candidate_authors(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
    ) -> AppResult<BTreeSet<UserId>> {
        let mut authors = BTreeSet::from([user.clone()]);
        authors.extend(self.graph.friend_ids(tx, user).await?);
        authors.extend(self.graph.following_ids(tx, user).await?);
        Ok(authors)
    }

    /// Newest first; equal timestamps fall back to id descending so pages stay stable
    pub async fn compute_feed(
        &self,
        tx: &mut StoreTransaction,
        user: &UserId,
        page: Page,
    ) -> AppResult<Vec<FeedPost>> {
        let authors = self.candidate_authors(tx, user).await?;
        debug!("Feed for {} draws from {} authors", user, authors.len());
        self.store.posts_by_authors(tx, user, &authors, page).await
    }

    /// A single post with the viewer's like projection
    pub async fn view_post(
        &self,
        tx: &mut StoreTransaction,
        viewer: &UserId,
        post_id: PostId,
    ) -> AppResult<FeedPost> {
        self.store
            .get_feed_post(tx, viewer, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))
    }
}
