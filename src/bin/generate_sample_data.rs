use futures::future::try_join_all;
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use social_graph_engine::core::{Page, PostId, UserId};
use social_graph_engine::models::{FriendRequestDecision, GroupPrivacy};
use social_graph_engine::{Config, SocialEngine, ViewerContext};

const USERNAMES: &[&str] = &[
    "alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi", "ivan", "judy",
];

const CAPTIONS: &[&str] = &[
    "Morning run along the river",
    "Finally finished the bookshelf",
    "Trying a new ramen place tonight",
    "Weekend hike photos",
    "Release day!",
    "Rainy afternoon, good coffee",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Generating sample data into {}", config.database.url);
    let engine = SocialEngine::from_config(&config).await?;

    // Users get fresh ids so repeated runs against one database stay apart
    let users: Vec<UserId> = USERNAMES.iter().map(|_| UserId::generate()).collect();
    for (user, name) in users.iter().zip(USERNAMES) {
        engine
            .register_user(user, name, Some(&format!("{}@example.com", name)))
            .await?;
    }
    info!("Registered {} users", users.len());

    let mut rng = rand::rng();

    // Friendships: each user befriends the next one, every request accepted
    for pair in users.windows(2) {
        let sender = ViewerContext::new(pair[0].clone());
        let receiver = ViewerContext::new(pair[1].clone());
        let request = engine.send_friend_request(&sender, &pair[1]).await?;
        engine
            .respond_to_friend_request(&receiver, request.id, FriendRequestDecision::Accept)
            .await?;
    }

    // Follows
    let mut follows = 0;
    for user in &users {
        let viewer = ViewerContext::new(user.clone());
        for target in users.choose_multiple(&mut rng, 3) {
            if target != user {
                engine.follow(&viewer, target).await?;
                follows += 1;
            }
        }
    }
    info!("Created {} friendships and {} follows", users.len() - 1, follows);

    // Posts, created concurrently per author
    let post_batches = try_join_all(users.iter().map(|user| {
        let engine = engine.clone();
        let viewer = ViewerContext::new(user.clone());
        let captions: Vec<&str> = CAPTIONS.choose_multiple(&mut rand::rng(), 2).copied().collect();
        async move {
            let mut posts = Vec::new();
            for caption in captions {
                posts.push(engine.create_post(&viewer, Some(caption), None).await?.id);
            }
            Ok::<Vec<PostId>, social_graph_engine::AppError>(posts)
        }
    }))
    .await?;
    let posts: Vec<PostId> = post_batches.into_iter().flatten().collect();
    info!("Created {} posts", posts.len());

    // Likes and comments
    let mut likes = 0;
    let mut comments = 0;
    for user in &users {
        let viewer = ViewerContext::new(user.clone());
        for post_id in &posts {
            if rng.random_bool(0.3) {
                engine.toggle_like(&viewer, *post_id).await?;
                likes += 1;
            }
            if rng.random_bool(0.1) {
                engine
                    .create_comment(&viewer, *post_id, &format!("Nice one from {}", user))
                    .await?;
                comments += 1;
            }
        }
    }
    info!("Recorded {} likes and {} comments", likes, comments);

    // Direct messages between the first two users
    let first = ViewerContext::new(users[0].clone());
    let second = ViewerContext::new(users[1].clone());
    let conversation = engine
        .create_conversation(&first, &[users[1].clone()], None)
        .await?;
    engine.post_message(&first, conversation.id, "Hey, saw your post!").await?;
    engine.post_message(&second, conversation.id, "Thanks, it was fun").await?;

    // A public group everyone joins, with a post from each of the first three
    let group = engine
        .create_group(&first, "Weekend hikers", Some("Trail reports"), GroupPrivacy::Public)
        .await?;
    for user in &users {
        engine.join_group(&ViewerContext::new(user.clone()), group.id).await?;
    }
    for user in users.iter().take(3) {
        let viewer = ViewerContext::new(user.clone());
        engine
            .create_group_post(&viewer, group.id, CAPTIONS.choose(&mut rng).copied(), None)
            .await?;
    }
    info!(
        "Group {} has {} members and {} posts",
        group.name,
        engine.list_group_members(group.id).await?.len(),
        engine.list_group_posts(group.id, Page::default()).await?.len()
    );

    // Summary
    let feed = engine.compute_feed(&first, Page::first(10)).await?;
    info!("Feed for {} ({} posts):", users[0], feed.len());
    for item in &feed {
        info!(
            "  post {} by {} likes={} liked={} caption={:?}",
            item.post.id, item.post.author, item.likes_count, item.is_liked, item.post.caption
        );
    }
    for user in &users {
        let viewer = ViewerContext::new(user.clone());
        info!(
            "{} has {} unread notifications",
            user,
            engine.unread_count(&viewer).await?
        );
    }

    info!("Sample data generated");
    Ok(())
}
