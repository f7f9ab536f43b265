mod common;

use social_graph_engine::config::Config;
use social_graph_engine::core::Page;
use social_graph_engine::models::LikeOutcome;
use social_graph_engine::{AppError, SocialEngine};

use common::{engine_with_config, register};

/// Two engines over one database file: `patient` with the default timeout,
/// `hasty` with a zero timeout so its operations give up at the first await
async fn engines(dir: &tempfile::TempDir) -> (SocialEngine, SocialEngine) {
    let mut config = Config::default();
    config.database.url = format!("sqlite://{}", dir.path().join("engine.db").display());
    let patient = engine_with_config(&config).await;

    config.engine.operation_timeout_ms = 0;
    config.engine.node_id = 2;
    let hasty = engine_with_config(&config).await;
    (patient, hasty)
}

#[tokio::test]
async fn test_timed_out_post_is_never_stored() {
    let dir = tempfile::tempdir().unwrap();
    let (patient, hasty) = engines(&dir).await;
    let users = register(&patient, &["author"]).await;
    let author = &users[0];

    let mut stored = 0;
    let mut timed_out = 0;
    for i in 0..10 {
        match hasty
            .create_post(author, Some(&format!("post {}", i)), None)
            .await
        {
            Ok(_) => stored += 1,
            Err(err) => {
                assert!(matches!(err, AppError::StoreUnavailable(_)), "{:?}", err);
                timed_out += 1;
            }
        }
        let feed = patient.compute_feed(author, Page::first(50)).await.unwrap();
        assert_eq!(feed.len(), stored);
    }
    assert!(timed_out > 0);

    // The store is still usable after the abandoned operations
    patient.create_post(author, Some("after"), None).await.unwrap();
    let feed = patient.compute_feed(author, Page::first(50)).await.unwrap();
    assert_eq!(feed.len(), stored + 1);
}

#[tokio::test]
async fn test_timed_out_toggle_leaves_like_and_notification_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (patient, hasty) = engines(&dir).await;
    let users = register(&patient, &["author", "fan"]).await;
    let (author, fan) = (&users[0], &users[1]);
    let post = patient.create_post(author, Some("photo"), None).await.unwrap();

    let mut expected_likes = 0;
    let mut expected_unread = 0;
    let mut timed_out = 0;
    for _ in 0..10 {
        match hasty.toggle_like(fan, post.id).await {
            Ok(toggle) => {
                if toggle.outcome == LikeOutcome::Liked {
                    expected_likes = 1;
                    expected_unread = 1;
                } else {
                    expected_likes = 0;
                }
            }
            Err(err) => {
                assert!(matches!(err, AppError::StoreUnavailable(_)), "{:?}", err);
                timed_out += 1;
            }
        }
        assert_eq!(patient.likes_count(post.id).await.unwrap(), expected_likes);
        assert_eq!(patient.unread_count(author).await.unwrap(), expected_unread);
    }
    assert!(timed_out > 0);

    let toggle = patient.toggle_like(fan, post.id).await.unwrap();
    let outcome = if expected_likes == 0 {
        LikeOutcome::Liked
    } else {
        LikeOutcome::Unliked
    };
    assert_eq!(toggle.outcome, outcome);
}
