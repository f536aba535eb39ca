//! PostgreSQL-backed stores over a deadpool connection pool.

use super::{ConversationStore, MessageStore, MAX_CREATE_ATTEMPTS};
use crate::error::{AppError, AppResult};
use crate::models::message::validate_outgoing;
use crate::models::{Attachment, Conversation, Message, ParticipantPair};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use std::collections::HashMap;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::Json;
use tokio_postgres::Row;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str =
    "id, participant_low, participant_high, last_message, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, attachments, seen, sequence_number, created_at, updated_at";

const TOUCH_CONVERSATION: &str = "UPDATE conversations \
     SET last_message = $2, updated_at = GREATEST(updated_at, clock_timestamp()) \
     WHERE id = $1";

/// Allocates the next per-conversation sequence number and inserts the message.
/// The counter row lock is held until commit, so a later sequence number also
/// observes a later clock_timestamp().
fn insert_message_sql() -> String {
    format!(
        r#"
        WITH next AS (
            INSERT INTO conversation_counters (conversation_id, last_seq)
            VALUES ($2, 1)
            ON CONFLICT (conversation_id)
            DO UPDATE SET last_seq = conversation_counters.last_seq + 1
            RETURNING last_seq
        )
        INSERT INTO messages (
            id, conversation_id, sender_id, content, attachments,
            seen, sequence_number, created_at, updated_at
        )
        SELECT $1, $2, $3, $4, $5, FALSE, next.last_seq, clock_timestamp(), clock_timestamp()
        FROM next
        RETURNING {MESSAGE_COLUMNS}
        "#
    )
}

fn insert_error(e: tokio_postgres::Error) -> AppError {
    match e.code() {
        Some(code) if *code == SqlState::FOREIGN_KEY_VIOLATION => AppError::NotFound("conversation"),
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => {
            AppError::Conflict(format!("message insert: {e}"))
        }
        _ => e.into(),
    }
}

fn conversation_from_row(row: &Row) -> Conversation {
    Conversation {
        id: row.get("id"),
        participants: [row.get("participant_low"), row.get("participant_high")],
        last_message: row.get("last_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &Row) -> Message {
    let Json(attachments): Json<Vec<Attachment>> = row.get("attachments");
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        attachments,
        seen: row.get("seen"),
        sequence_number: row.get("sequence_number"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[derive(Clone)]
pub struct PgConversationStore {
    db: Pool,
}

impl PgConversationStore {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }

    async fn find_by_pair(&self, pair: ParticipantPair) -> AppResult<Option<Conversation>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE participant_low = $1 AND participant_high = $2"
                ),
                &[&pair.low(), &pair.high()],
            )
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    /// Insert the pair, or report `Conflict` when a concurrent caller won the race.
    async fn try_insert(&self, pair: ParticipantPair) -> AppResult<Conversation> {
        let draft = Conversation::new(pair);
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "INSERT INTO conversations (id, participant_low, participant_high, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $4) \
                     ON CONFLICT (participant_low, participant_high) DO NOTHING \
                     RETURNING {CONVERSATION_COLUMNS}"
                ),
                &[&draft.id, &pair.low(), &pair.high(), &draft.created_at],
            )
            .await?;

        row.as_ref()
            .map(conversation_from_row)
            .ok_or_else(|| AppError::Conflict(format!("pair {}:{} already exists", pair.low(), pair.high())))
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_or_create(&self, a: Uuid, b: Uuid) -> AppResult<(Conversation, bool)> {
        let pair = ParticipantPair::new(a, b).ok_or_else(|| {
            AppError::Validation("a conversation needs two distinct participants".into())
        })?;

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            if let Some(existing) = self.find_by_pair(pair).await? {
                return Ok((existing, false));
            }
            match self.try_insert(pair).await {
                Ok(created) => return Ok((created, true)),
                Err(AppError::Conflict(_)) => {
                    tracing::debug!(attempt, low = %pair.low(), high = %pair.high(), "lost conversation creation race, retrying lookup");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(format!(
            "conversation for {}:{} could not be resolved",
            pair.low(),
            pair.high()
        )))
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE participant_low = $1 OR participant_high = $1 \
                     ORDER BY updated_at DESC"
                ),
                &[&user_id],
            )
            .await?;
        Ok(rows.iter().map(conversation_from_row).collect())
    }

    async fn touch(&self, id: Uuid, last_message: &str) -> AppResult<Conversation> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                &format!("{TOUCH_CONVERSATION} RETURNING {CONVERSATION_COLUMNS}"),
                &[&id, &last_message],
            )
            .await?;
        row.as_ref()
            .map(conversation_from_row)
            .ok_or(AppError::NotFound("conversation"))
    }
}

#[derive(Clone)]
pub struct PgMessageStore {
    db: Pool,
}

impl PgMessageStore {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        attachments: &[Attachment],
    ) -> AppResult<Message> {
        validate_outgoing(content, attachments, usize::MAX)?;

        let id = Uuid::new_v4();
        let attachments = Json(attachments.to_vec());
        let client = self.db.get().await?;
        let row = client
            .query_one(
                &insert_message_sql(),
                &[&id, &conversation_id, &sender_id, &content, &attachments],
            )
            .await
            .map_err(insert_error)?;
        Ok(message_from_row(&row))
    }

    async fn append_and_touch(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        attachments: &[Attachment],
        preview: &str,
    ) -> AppResult<Message> {
        validate_outgoing(content, attachments, usize::MAX)?;

        let id = Uuid::new_v4();
        let attachments = Json(attachments.to_vec());
        let mut client = self.db.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_one(
                &insert_message_sql(),
                &[&id, &conversation_id, &sender_id, &content, &attachments],
            )
            .await
            .map_err(insert_error)?;

        // Dropping the transaction without commit rolls the insert back
        let touched = tx
            .execute(TOUCH_CONVERSATION, &[&conversation_id, &preview])
            .await?;
        if touched == 0 {
            return Err(AppError::NotFound("conversation"));
        }

        tx.commit().await?;
        Ok(message_from_row(&row))
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages \
                     WHERE conversation_id = $1 ORDER BY sequence_number ASC"
                ),
                &[&conversation_id],
            )
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn mark_seen(&self, conversation_id: Uuid, except_sender: Uuid) -> AppResult<u64> {
        let client = self.db.get().await?;
        let updated = client
            .execute(
                "UPDATE messages SET seen = TRUE, updated_at = clock_timestamp() \
                 WHERE conversation_id = $1 AND sender_id <> $2 AND seen = FALSE",
                &[&conversation_id, &except_sender],
            )
            .await?;
        Ok(updated)
    }

    async fn delete_all(&self, conversation_id: Uuid) -> AppResult<u64> {
        let client = self.db.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM messages WHERE conversation_id = $1",
                &[&conversation_id],
            )
            .await?;
        Ok(deleted)
    }

    async fn get(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"),
                &[&message_id],
            )
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn delete(&self, message_id: Uuid) -> AppResult<bool> {
        let client = self.db.get().await?;
        let deleted = client
            .execute("DELETE FROM messages WHERE id = $1", &[&message_id])
            .await?;
        Ok(deleted > 0)
    }

    async fn unread_counts(
        &self,
        conversation_ids: &[Uuid],
        reader: Uuid,
    ) -> AppResult<HashMap<Uuid, u64>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let client = self.db.get().await?;
        let rows = client
            .query(
                "SELECT conversation_id, COUNT(*) AS unread FROM messages \
                 WHERE conversation_id = ANY($1) AND sender_id <> $2 AND seen = FALSE \
                 GROUP BY conversation_id",
                &[&conversation_ids, &reader],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let conversation_id: Uuid = row.get("conversation_id");
                let unread: i64 = row.get("unread");
                (conversation_id, unread.max(0) as u64)
            })
            .collect())
    }
}
