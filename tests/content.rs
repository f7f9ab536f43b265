mod common;

use social_graph_engine::core::Page;
use social_graph_engine::models::{NotificationKind, PostPatch};
use social_graph_engine::AppError;

use common::{engine, register};

#[tokio::test]
async fn test_post_requires_content() {
    let engine = engine().await;
    let users = register(&engine, &["alice"]).await;

    let err = engine
        .create_post(&users[0], Some("  "), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let post = engine
        .create_post(&users[0], None, Some("img/cat.png"))
        .await
        .unwrap();
    assert_eq!(post.image.as_deref(), Some("img/cat.png"));
    assert!(post.caption.is_none());
}

#[tokio::test]
async fn test_update_post_is_author_only() {
    let engine = engine().await;
    let users = register(&engine, &["alice", "bob"]).await;
    let (alice, bob) = (&users[0], &users[1]);
    let post = engine
        .create_post(alice, Some("draft"), Some("img/a.png"))
        .await
        .unwrap();

    let err = engine
        .update_post(bob, post.id, &PostPatch::new().caption("hijacked"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let updated = engine
        .update_post(alice, post.id, &PostPatch::new().caption("final"))
        .await
        .unwrap();
    assert_eq!(updated.caption.as_deref(), Some("final"));
    assert_eq!(updated.image.as_deref(), Some("img/a.png"));

    let stored = engine.get_post(bob, post.id).await.unwrap();
    assert_eq!(stored.post, updated);

    // Clearing both fields would leave an empty post
    let err = engine
        .update_post(alice, post.id, &PostPatch::new().caption("").image(""))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_delete_post_removes_it_from_feeds() {
    let engine = engine().await;
    let users = register(&engine, &["alice", "bob"]).await;
    let (alice, bob) = (&users[0], &users[1]);
    engine.follow(bob, alice.user_id()).await.unwrap();

    let post = engine.create_post(alice, Some("soon gone"), None).await.unwrap();
    engine.toggle_like(bob, post.id).await.unwrap();
    engine.create_comment(bob, post.id, "nice").await.unwrap();

    let err = engine.delete_post(bob, post.id).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    engine.delete_post(alice, post.id).await.unwrap();
    assert!(engine.compute_feed(bob, Page::default()).await.unwrap().is_empty());
    assert!(matches!(
        engine.get_post(bob, post.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        engine.list_comments(post.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));

    // Notifications outlive the post but lose the reference
    let notifications = engine
        .list_notifications(alice, Page::default())
        .await
        .unwrap();
    assert!(notifications
        .iter()
        .filter(|n| n.kind != NotificationKind::Follow)
        .all(|n| n.post_id.is_none()));
}

#[tokio::test]
async fn test_comments_notify_post_author() {
    let engine = engine().await;
    let users = register(&engine, &["alice", "bob"]).await;
    let (alice, bob) = (&users[0], &users[1]);
    let post = engine.create_post(alice, Some("thoughts?"), None).await.unwrap();

    engine.create_comment(bob, post.id, "first").await.unwrap();
    engine.create_comment(bob, post.id, "second").await.unwrap();
    engine.create_comment(alice, post.id, "thanks").await.unwrap();

    let comments = engine.list_comments(post.id).await.unwrap();
    let contents: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "thanks"]);

    // Two from bob, none for commenting on your own post
    let notifications = engine
        .list_notifications(alice, Page::default())
        .await
        .unwrap();
    assert_eq!(notifications.len(), 2);
    assert!(notifications
        .iter()
        .all(|n| n.kind == NotificationKind::Comment && n.post_id == Some(post.id)));
}

#[tokio::test]
async fn test_comment_deletion_rule() {
    let engine = engine().await;
    let users = register(&engine, &["owner", "commenter", "stranger"]).await;
    let (owner, commenter, stranger) = (&users[0], &users[1], &users[2]);
    let post = engine.create_post(owner, Some("post"), None).await.unwrap();

    let first = engine.create_comment(commenter, post.id, "one").await.unwrap();
    let second = engine.create_comment(commenter, post.id, "two").await.unwrap();

    let err = engine.delete_comment(stranger, first.id).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    engine.delete_comment(commenter, first.id).await.unwrap();
    engine.delete_comment(owner, second.id).await.unwrap();
    assert!(engine.list_comments(post.id).await.unwrap().is_empty());

    let err = engine.delete_comment(owner, first.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_comment_on_missing_post() {
    let engine = engine().await;
    let users = register(&engine, &["alice"]).await;

    let err = engine
        .create_comment(&users[0], social_graph_engine::core::PostId::new(7), "hello?")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
