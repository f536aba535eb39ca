//! Runs against a real database: `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`

use chat_service::db::run_migrations;
use chat_service::error::AppError;
use chat_service::models::{Attachment, AttachmentKind};
use chat_service::repository::{ConversationStore, MessageStore, PgConversationStore, PgMessageStore};
use db_pool::{create_pool, DbConfig, PgPool};
use std::collections::HashSet;
use uuid::Uuid;

async fn pool() -> PgPool {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for postgres store tests");
    let pool = create_pool(DbConfig {
        service_name: "chat-service-test".into(),
        database_url,
        max_connections: 8,
        ..DbConfig::default()
    })
    .await
    .expect("connect to test database");
    run_migrations(&pool).await.expect("apply migrations");
    pool
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn pg_concurrent_find_or_create_yields_one_row() {
    let store = PgConversationStore::new(pool().await);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                store.find_or_create(a, b).await
            } else {
                store.find_or_create(b, a).await
            }
        }));
    }

    let mut ids = HashSet::new();
    let mut created = 0;
    for handle in handles {
        let (conversation, was_created) = handle.await.unwrap().unwrap();
        ids.insert(conversation.id);
        created += usize::from(was_created);
    }
    assert_eq!(ids.len(), 1);
    assert_eq!(created, 1);
}

#[tokio::test]
#[ignore]
async fn pg_messages_are_sequenced_and_seen_is_monotonic() {
    let pool = pool().await;
    let conversations = PgConversationStore::new(pool.clone());
    let messages = PgMessageStore::new(pool);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let (conversation, _) = conversations.find_or_create(a, b).await.unwrap();

    let attachment = Attachment {
        path: "/uploads/voice.ogg".into(),
        name: "voice.ogg".into(),
        size: 5120,
        kind: AttachmentKind::Audio,
    };
    messages.append(conversation.id, a, "first", &[]).await.unwrap();
    messages.append(conversation.id, b, "second", &[]).await.unwrap();
    messages
        .append(conversation.id, a, "", &[attachment.clone()])
        .await
        .unwrap();

    let listed = messages.list_by_conversation(conversation.id).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.windows(2).all(|w| w[0].sequence_number < w[1].sequence_number));
    assert_eq!(listed[2].attachments, vec![attachment]);

    let unread = messages.unread_counts(&[conversation.id], b).await.unwrap();
    assert_eq!(unread.get(&conversation.id), Some(&2));
    assert_eq!(messages.mark_seen(conversation.id, b).await.unwrap(), 2);
    assert_eq!(messages.mark_seen(conversation.id, b).await.unwrap(), 0);

    let touched = conversations.touch(conversation.id, "second").await.unwrap();
    assert_eq!(touched.last_message.as_deref(), Some("second"));

    assert_eq!(messages.delete_all(conversation.id).await.unwrap(), 3);
    assert!(conversations.get(conversation.id).await.unwrap().is_some());

    let after = messages.append(conversation.id, a, "again", &[]).await.unwrap();
    assert_eq!(after.sequence_number, 4);
}

#[tokio::test]
#[ignore]
async fn pg_append_to_missing_conversation_is_not_found() {
    let messages = PgMessageStore::new(pool().await);
    let result = messages.append(Uuid::new_v4(), Uuid::new_v4(), "hi", &[]).await;
    assert!(matches!(result, Err(AppError::NotFound("conversation"))));
}

#[tokio::test]
#[ignore]
async fn pg_append_and_touch_is_one_unit() {
    let pool = pool().await;
    let conversations = PgConversationStore::new(pool.clone());
    let messages = PgMessageStore::new(pool);
    let a = Uuid::new_v4();
    let (conversation, _) = conversations.find_or_create(a, Uuid::new_v4()).await.unwrap();

    let sent = messages
        .append_and_touch(conversation.id, a, "hello", &[], "hello")
        .await
        .unwrap();
    let touched = conversations.get(conversation.id).await.unwrap().unwrap();
    assert_eq!(touched.last_message.as_deref(), Some("hello"));
    assert_eq!(sent.sequence_number, 1);

    let missing = Uuid::new_v4();
    let result = messages
        .append_and_touch(missing, a, "orphan", &[], "orphan")
        .await;
    assert!(matches!(result, Err(AppError::NotFound("conversation"))));
    assert!(messages.list_by_conversation(missing).await.unwrap().is_empty());
}
