use async_trait::async_trait;
use domain::{Conversation, ConversationId, Message, RepositoryError, Timestamp, UserId};

#[async_trait]
pub trait MessageRepository: Send + Sync {
    // 持久化一条新消息，返回存储后的完整记录
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError>;

    // 会话全部历史，按 created_at 升序，同一时间按插入顺序
    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError>;

    // 原子条件更新：发给 recipient 且仍为 sent 的消息 → delivered，返回更新条数
    async fn mark_delivered(
        &self,
        conversation_id: ConversationId,
        recipient: UserId,
    ) -> Result<u64, RepositoryError>;

    // 原子条件更新：发给 reader 且为 sent/delivered 的消息 → read，写入 read_at
    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
        read_at: Timestamp,
    ) -> Result<u64, RepositoryError>;
}

/// 外部应用目录：conversation_id → 两方参与者，只读
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    async fn find(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;
}

/// 内存实现（用于测试和本地运行）
pub mod memory {
    use super::*;
    use domain::DeliveryState;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct InMemoryMessageRepository {
        messages: RwLock<Vec<Message>>,
    }

    impl InMemoryMessageRepository {
        pub fn new() -> Self {
            Self::default()
        }

        async fn advance(
            &self,
            conversation_id: ConversationId,
            recipient: UserId,
            target: DeliveryState,
            at: Timestamp,
        ) -> u64 {
            let mut messages = self.messages.write().await;
            messages
                .iter_mut()
                .filter(|m| m.conversation_id == conversation_id && m.is_addressed_to(recipient))
                .map(|m| m.advance_to(target, at))
                .filter(|changed| *changed)
                .count() as u64
        }
    }

    #[async_trait]
    impl MessageRepository for InMemoryMessageRepository {
        async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
            self.messages.write().await.push(message.clone());
            Ok(message)
        }

        async fn list_by_conversation(
            &self,
            conversation_id: ConversationId,
        ) -> Result<Vec<Message>, RepositoryError> {
            let messages = self.messages.read().await;
            let mut items: Vec<Message> = messages
                .iter()
                .filter(|m| m.conversation_id == conversation_id)
                .cloned()
                .collect();
            // sort_by_key 是稳定排序，时间相同的保持插入顺序
            items.sort_by_key(|m| m.created_at);
            Ok(items)
        }

        async fn mark_delivered(
            &self,
            conversation_id: ConversationId,
            recipient: UserId,
        ) -> Result<u64, RepositoryError> {
            // delivered 不写时间，这里的时间戳不会被使用
            Ok(self
                .advance(
                    conversation_id,
                    recipient,
                    DeliveryState::Delivered,
                    chrono::Utc::now(),
                )
                .await)
        }

        async fn mark_read(
            &self,
            conversation_id: ConversationId,
            reader: UserId,
            read_at: Timestamp,
        ) -> Result<u64, RepositoryError> {
            Ok(self
                .advance(conversation_id, reader, DeliveryState::Read, read_at)
                .await)
        }
    }

    #[derive(Default)]
    pub struct InMemoryConversationDirectory {
        conversations: RwLock<HashMap<ConversationId, Conversation>>,
    }

    impl InMemoryConversationDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert(&self, conversation: Conversation) {
            self.conversations
                .write()
                .await
                .insert(conversation.id, conversation);
        }
    }

    #[async_trait]
    impl ConversationDirectory for InMemoryConversationDirectory {
        async fn find(
            &self,
            conversation_id: ConversationId,
        ) -> Result<Option<Conversation>, RepositoryError> {
            Ok(self.conversations.read().await.get(&conversation_id).copied())
        }
    }
}
