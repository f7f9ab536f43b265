mod common;

use futures::future::join_all;
use social_graph_engine::config::Config;
use social_graph_engine::core::{Page, PostId};
use social_graph_engine::models::{FriendRequestDecision, LikeOutcome, NotificationKind};
use social_graph_engine::AppError;

use common::{engine, engine_with_config, register};

#[tokio::test]
async fn test_feed_unions_self_friends_and_followees() {
    let engine = engine().await;
    let users = register(&engine, &["a", "b", "c", "d"]).await;
    let (a, b, c, d) = (&users[0], &users[1], &users[2], &users[3]);

    let request = engine.send_friend_request(a, b.user_id()).await.unwrap();
    engine
        .respond_to_friend_request(b, request.id, FriendRequestDecision::Accept)
        .await
        .unwrap();
    engine.follow(a, c.user_id()).await.unwrap();
    // A friend who is also followed appears once
    engine.follow(a, b.user_id()).await.unwrap();

    let mut created = Vec::new();
    for author in [a, b, c, d, b, a] {
        created.push(engine.create_post(author, Some("hello"), None).await.unwrap());
    }

    let feed = engine.compute_feed(a, Page::first(50)).await.unwrap();
    let ids: Vec<PostId> = feed.iter().map(|item| item.post.id).collect();
    let expected: Vec<PostId> = created
        .iter()
        .rev()
        .filter(|post| &post.author != d.user_id())
        .map(|post| post.id)
        .collect();
    assert_eq!(ids, expected);

    // D is outside A's graph, but D's own feed has D's post
    let d_feed = engine.compute_feed(d, Page::first(50)).await.unwrap();
    assert_eq!(d_feed.len(), 1);
    assert_eq!(&d_feed[0].post.author, d.user_id());
}

#[tokio::test]
async fn test_feed_pagination_is_stable() {
    let engine = engine().await;
    let users = register(&engine, &["writer"]).await;
    let writer = &users[0];

    for i in 0..7 {
        engine
            .create_post(writer, Some(&format!("post {}", i)), None)
            .await
            .unwrap();
    }

    let full: Vec<PostId> = engine
        .compute_feed(writer, Page::first(50))
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.post.id)
        .collect();
    assert_eq!(full.len(), 7);

    let mut paged = Vec::new();
    let mut page = Page::first(3);
    loop {
        let items = engine.compute_feed(writer, page).await.unwrap();
        if items.is_empty() {
            break;
        }
        paged.extend(items.into_iter().map(|item| item.post.id));
        page = page.next();
    }
    assert_eq!(paged, full);
}

#[tokio::test]
async fn test_page_limit_is_clamped() {
    let mut config = Config::default();
    config.engine.max_page_size = 2;
    let engine = engine_with_config(&config).await;
    let users = register(&engine, &["writer"]).await;

    for _ in 0..4 {
        engine.create_post(&users[0], Some("x"), None).await.unwrap();
    }
    let feed = engine.compute_feed(&users[0], Page::first(100)).await.unwrap();
    assert_eq!(feed.len(), 2);
}

#[tokio::test]
async fn test_toggle_like_is_its_own_inverse() {
    let engine = engine().await;
    let users = register(&engine, &["author", "fan"]).await;
    let (author, fan) = (&users[0], &users[1]);
    let post = engine.create_post(author, Some("photo"), None).await.unwrap();

    let liked = engine.toggle_like(fan, post.id).await.unwrap();
    assert_eq!(liked.outcome, LikeOutcome::Liked);
    assert_eq!(liked.likes_count, 1);

    let view = engine.get_post(fan, post.id).await.unwrap();
    assert!(view.is_liked);
    assert_eq!(view.likes_count, 1);
    assert!(!engine.get_post(author, post.id).await.unwrap().is_liked);

    let unliked = engine.toggle_like(fan, post.id).await.unwrap();
    assert_eq!(unliked.outcome, LikeOutcome::Unliked);
    assert_eq!(unliked.likes_count, 0);
    assert_eq!(engine.likes_count(post.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_like_unlike_like_notifies_once() {
    let engine = engine().await;
    let users = register(&engine, &["author", "fan"]).await;
    let (author, fan) = (&users[0], &users[1]);
    let post = engine.create_post(author, Some("photo"), None).await.unwrap();

    engine.toggle_like(fan, post.id).await.unwrap();
    engine.mark_all_read(author).await.unwrap();
    engine.toggle_like(fan, post.id).await.unwrap();
    engine.toggle_like(fan, post.id).await.unwrap();

    let notifications = engine
        .list_notifications(author, Page::default())
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Like);
    assert_eq!(notifications[0].post_id, Some(post.id));
    assert!(notifications[0].is_read);

    // Liking your own post is silent
    engine.toggle_like(author, post.id).await.unwrap();
    assert_eq!(
        engine
            .list_notifications(author, Page::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_like_missing_post() {
    let engine = engine().await;
    let users = register(&engine, &["fan"]).await;

    let err = engine
        .toggle_like(&users[0], PostId::new(12345))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_toggles_by_same_user_converge() {
    let engine = engine().await;
    let users = register(&engine, &["author", "fan"]).await;
    let (author, fan) = (&users[0], &users[1]);
    let post = engine.create_post(author, Some("photo"), None).await.unwrap();

    let results = join_all((0..3).map(|_| engine.toggle_like(fan, post.id))).await;
    let liked = results
        .iter()
        .filter(|r| r.as_ref().unwrap().outcome == LikeOutcome::Liked)
        .count();
    assert_eq!(liked, 2);
    assert_eq!(engine.likes_count(post.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_likes_on_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.url = format!("sqlite://{}", dir.path().join("engine.db").display());
    let engine = engine_with_config(&config).await;

    let names: Vec<String> = (0..8).map(|i| format!("fan{}", i)).collect();
    let mut all = vec!["author"];
    all.extend(names.iter().map(String::as_str));
    let users = register(&engine, &all).await;
    let post = engine.create_post(&users[0], Some("popular"), None).await.unwrap();

    let results = join_all(
        users[1..]
            .iter()
            .map(|fan| engine.toggle_like(fan, post.id)),
    )
    .await;
    for result in &results {
        assert_eq!(result.as_ref().unwrap().outcome, LikeOutcome::Liked);
    }
    assert_eq!(engine.likes_count(post.id).await.unwrap(), 8);
    assert_eq!(engine.unread_count(&users[0]).await.unwrap(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_by_same_user_on_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.url = format!("sqlite://{}", dir.path().join("engine.db").display());
    let engine = engine_with_config(&config).await;

    let users = register(&engine, &["author", "fan"]).await;
    let post = engine.create_post(&users[0], Some("photo"), None).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let engine = engine.clone();
            let fan = users[1].clone();
            tokio::spawn(async move { engine.toggle_like(&fan, post.id).await })
        })
        .collect();

    let mut liked: u64 = 0;
    let mut unliked: u64 = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap().outcome {
            LikeOutcome::Liked => liked += 1,
            LikeOutcome::Unliked => unliked += 1,
        }
    }
    assert_eq!(liked + unliked, 20);
    assert_eq!(engine.likes_count(post.id).await.unwrap(), liked - unliked);
    assert!(liked - unliked <= 1);
}

#[tokio::test]
async fn test_mark_all_read_is_idempotent() {
    let engine = engine().await;
    let users = register(&engine, &["author", "fan"]).await;
    let (author, fan) = (&users[0], &users[1]);
    let post = engine.create_post(author, Some("photo"), None).await.unwrap();

    engine.follow(fan, author.user_id()).await.unwrap();
    engine.toggle_like(fan, post.id).await.unwrap();
    engine.create_comment(fan, post.id, "great").await.unwrap();
    engine.create_comment(fan, post.id, "really great").await.unwrap();

    assert_eq!(engine.unread_count(author).await.unwrap(), 4);
    assert_eq!(engine.mark_all_read(author).await.unwrap(), 4);
    assert_eq!(engine.mark_all_read(author).await.unwrap(), 0);
    assert_eq!(engine.unread_count(author).await.unwrap(), 0);

    let notifications = engine
        .list_notifications(author, Page::default())
        .await
        .unwrap();
    assert_eq!(notifications.len(), 4);
    assert_eq!(notifications[0].kind, NotificationKind::Comment);
    assert!(notifications.iter().all(|n| n.is_read));
}
