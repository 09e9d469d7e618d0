use application::repository::{ConversationDirectory, MessageRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Conversation, ConversationId, DeliveryState, Message, MessageBody, MessageId,
    RepositoryError, Timestamp, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        other => RepositoryError::storage(other.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    body: String,
    state: String,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let body = MessageBody::parse(value.body).map_err(|err| invalid_data(err.to_string()))?;
        let state = value
            .state
            .parse::<DeliveryState>()
            .map_err(|err| invalid_data(err.to_string()))?;

        Message::restore(
            MessageId::from(value.id),
            ConversationId::from(value.conversation_id),
            UserId::from(value.sender_id),
            body,
            state,
            value.read_at,
            value.created_at,
        )
        .map_err(|err| invalid_data(err.to_string()))
    }
}

#[derive(Debug, FromRow)]
struct ApplicationRecord {
    id: Uuid,
    applicant_id: Uuid,
    employer_id: Uuid,
}

impl From<ApplicationRecord> for Conversation {
    fn from(value: ApplicationRecord) -> Self {
        Conversation::new(
            ConversationId::from(value.id),
            UserId::from(value.applicant_id),
            UserId::from(value.employer_id),
        )
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, body, state, read_at, created_at";

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let query = format!(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body, state, read_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(Uuid::from(message.id))
            .bind(Uuid::from(message.conversation_id))
            .bind(Uuid::from(message.sender_id))
            .bind(message.body.as_str())
            .bind(message.state.as_str())
            .bind(message.read_at)
            .bind(message.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, seq ASC
            "#
        );
        let records = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(Uuid::from(conversation_id))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn mark_delivered(
        &self,
        conversation_id: ConversationId,
        recipient: UserId,
    ) -> Result<u64, RepositoryError> {
        // 单条条件更新，并发执行时每行只会被升级一次
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET state = 'delivered'
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND state = 'sent'
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(recipient))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }

    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
        read_at: Timestamp,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET state = 'read', read_at = $3
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND state IN ('sent', 'delivered')
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(reader))
        .bind(read_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

/// 只读访问外部维护的 `applications` 表
#[derive(Clone)]
pub struct PgConversationDirectory {
    pool: PgPool,
}

impl PgConversationDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationDirectory for PgConversationDirectory {
    async fn find(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ApplicationRecord>(
            r#"
            SELECT id, applicant_id, employer_id
            FROM applications
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Conversation::from))
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
