#![allow(dead_code)]

use social_graph_engine::config::Config;
use social_graph_engine::core::UserId;
use social_graph_engine::{SocialEngine, ViewerContext};

pub async fn engine() -> SocialEngine {
    SocialEngine::from_config(&Config::default()).await.unwrap()
}

pub async fn engine_with_config(config: &Config) -> SocialEngine {
    SocialEngine::from_config(config).await.unwrap()
}

/// Registers each name and returns a viewer per user, in order
pub async fn register(engine: &SocialEngine, names: &[&str]) -> Vec<ViewerContext> {
    let mut viewers = Vec::new();
    for name in names {
        let id = UserId::from(*name);
        engine.register_user(&id, name, None).await.unwrap();
        viewers.push(ViewerContext::new(id));
    }
    viewers
}
