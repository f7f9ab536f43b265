mod common;

use social_graph_engine::core::{ConversationId, Page, UserId};
use social_graph_engine::AppError;

use common::{engine, register};

#[tokio::test]
async fn test_creator_is_always_a_participant() {
    let engine = engine().await;
    let users = register(&engine, &["alice", "bob"]).await;
    let (alice, bob) = (&users[0], &users[1]);

    let conversation = engine
        .create_conversation(alice, &[bob.user_id().clone()], Some("  lunch  "))
        .await
        .unwrap();
    assert_eq!(conversation.participants.len(), 2);
    assert!(conversation.is_participant(alice.user_id()));
    assert_eq!(conversation.name.as_deref(), Some("lunch"));

    let fetched = engine.get_conversation(bob, conversation.id).await.unwrap();
    assert_eq!(fetched.participants, conversation.participants);
    assert_eq!(engine.list_conversations(bob).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_conversation_needs_two_members() {
    let engine = engine().await;
    let users = register(&engine, &["alice"]).await;
    let alice = &users[0];

    for participants in [vec![], vec![alice.user_id().clone()]] {
        let err = engine
            .create_conversation(alice, &participants, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyParticipants(_)));
    }

    let err = engine
        .create_conversation(alice, &[UserId::from("ghost")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(engine.list_conversations(alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_messages_are_participant_only_and_chronological() {
    let engine = engine().await;
    let users = register(&engine, &["alice", "bob", "mallory"]).await;
    let (alice, bob, mallory) = (&users[0], &users[1], &users[2]);

    let conversation = engine
        .create_conversation(alice, &[bob.user_id().clone()], None)
        .await
        .unwrap();

    let first = engine.post_message(alice, conversation.id, "hi").await.unwrap();
    let second = engine.post_message(bob, conversation.id, "hello").await.unwrap();
    let third = engine.post_message(alice, conversation.id, "lunch?").await.unwrap();

    let err = engine
        .post_message(mallory, conversation.id, "let me in")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAParticipant(_)));

    let messages = engine
        .list_messages(bob, conversation.id, Page::default())
        .await
        .unwrap();
    let ids: Vec<_> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![first.id, second.id, third.id]);
    assert!(messages.iter().all(|m| m.content != "let me in"));

    let err = engine
        .list_messages(mallory, conversation.id, Page::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAParticipant(_)));
}

#[tokio::test]
async fn test_post_message_errors() {
    let engine = engine().await;
    let users = register(&engine, &["alice", "bob"]).await;
    let (alice, bob) = (&users[0], &users[1]);

    let err = engine
        .post_message(alice, ConversationId::new(99), "anyone?")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let conversation = engine
        .create_conversation(alice, &[bob.user_id().clone()], None)
        .await
        .unwrap();
    let err = engine
        .post_message(alice, conversation.id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_membership_is_checked_before_content() {
    let engine = engine().await;
    let users = register(&engine, &["alice", "bob", "mallory"]).await;
    let (alice, bob, mallory) = (&users[0], &users[1], &users[2]);

    let conversation = engine
        .create_conversation(alice, &[bob.user_id().clone()], None)
        .await
        .unwrap();

    let err = engine
        .post_message(mallory, conversation.id, "")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAParticipant(_)));

    let err = engine
        .post_message(alice, ConversationId::new(404), "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_add_participant() {
    let engine = engine().await;
    let users = register(&engine, &["alice", "bob", "carol", "dave"]).await;
    let (alice, bob, carol, dave) = (&users[0], &users[1], &users[2], &users[3]);

    let conversation = engine
        .create_conversation(alice, &[bob.user_id().clone()], None)
        .await
        .unwrap();

    let err = engine
        .add_participant(dave, conversation.id, dave.user_id())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAParticipant(_)));

    let updated = engine
        .add_participant(bob, conversation.id, carol.user_id())
        .await
        .unwrap();
    assert_eq!(updated.participants.len(), 3);

    // Adding an existing member changes nothing
    let again = engine
        .add_participant(alice, conversation.id, carol.user_id())
        .await
        .unwrap();
    assert_eq!(again.participants, updated.participants);

    engine
        .post_message(carol, conversation.id, "thanks for the invite")
        .await
        .unwrap();
}
