// Engine components. Each operation takes the caller's transaction so a
// mutation and its notification side effect commit or roll back together.

pub mod authorization;
pub mod content_service;
pub mod conversation_service;
pub mod feed_aggregator;
pub mod group_service;
pub mod like_set;
pub mod notification_engine;
pub mod relationship_graph;

pub use content_service::ContentService;
pub use conversation_service::ConversationService;
pub use feed_aggregator::FeedAggregator;
pub use group_service::GroupService;
pub use like_set::LikeSet;
pub use notification_engine::{dedup_policy, DedupPolicy, NotificationEngine};
pub use relationship_graph::RelationshipGraph;
