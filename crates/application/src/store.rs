//! 消息存储用例
//!
//! 在仓储之上做参与者校验、正文校验和时间戳分配。

use std::sync::Arc;

use domain::{
    Conversation, ConversationId, DeliveryState, DomainError, Message, MessageBody, MessageId,
    RepositoryError, Timestamp, UserId,
};

use crate::{
    authorization::AuthorizationGuard, clock::Clock, error::ApplicationError,
    repository::MessageRepository,
};

/// 标记已读的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadUpdate {
    pub updated: u64,
    pub read_at: Timestamp,
    /// 存储中途失败、只有部分记录生效时为 false
    pub complete: bool,
}

pub struct MessageStore {
    repository: Arc<dyn MessageRepository>,
    guard: Arc<AuthorizationGuard>,
    clock: Arc<dyn Clock>,
}

impl MessageStore {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        guard: Arc<AuthorizationGuard>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            guard,
            clock,
        }
    }

    pub fn guard(&self) -> &AuthorizationGuard {
        &self.guard
    }

    /// 追加一条消息。先校验参与者再校验正文，非参与者总是得到 Forbidden。
    pub async fn append(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        body: String,
        initial_state: DeliveryState,
    ) -> Result<Message, ApplicationError> {
        self.append_with(conversation_id, sender_id, body, |_| initial_state)
            .await
    }

    /// 同 `append`，初始状态在授权和正文校验之后、写入之前一刻才决定
    pub async fn append_with<F>(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        body: String,
        initial_state: F,
    ) -> Result<Message, ApplicationError>
    where
        F: FnOnce(&Conversation) -> DeliveryState + Send,
    {
        let conversation = self
            .guard
            .require_participant(conversation_id, sender_id)
            .await?;
        let body = MessageBody::parse(body)?;

        let message = Message::new(
            MessageId::generate(),
            conversation_id,
            sender_id,
            body,
            initial_state(&conversation),
            self.clock.now(),
        )?;

        let stored = self.repository.insert(message).await?;
        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %stored.id,
            state = %stored.state,
            "消息已持久化"
        );
        Ok(stored)
    }

    /// 会话完整历史（不分页）
    pub async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        requester: UserId,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.guard
            .require_participant(conversation_id, requester)
            .await?;
        Ok(self
            .repository
            .list_by_conversation(conversation_id)
            .await?)
    }

    /// 把对方发来的 sent/delivered 消息全部标记为已读
    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<ReadUpdate, ApplicationError> {
        self.guard
            .require_participant(conversation_id, reader)
            .await?;
        let read_at = self.clock.now();

        match self
            .repository
            .mark_read(conversation_id, reader, read_at)
            .await
        {
            Ok(updated) => Ok(ReadUpdate {
                updated,
                read_at,
                complete: true,
            }),
            Err(err) => Self::partial_or_err(err, conversation_id, "read").map(|updated| {
                ReadUpdate {
                    updated,
                    read_at,
                    complete: false,
                }
            }),
        }
    }

    /// 把发给 `recipient` 的 sent 消息升级为 delivered。
    /// 传入的 `conversation` 必须来自授权检查。
    pub async fn mark_delivered(
        &self,
        conversation: &Conversation,
        recipient: UserId,
    ) -> Result<u64, ApplicationError> {
        if !conversation.is_participant(recipient) {
            return Err(DomainError::NotParticipant.into());
        }

        match self
            .repository
            .mark_delivered(conversation.id, recipient)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(err) => Self::partial_or_err(err, conversation.id, "delivered"),
        }
    }

    // 部分成功按成功处理并记录日志，下一次 join/markRead 会补齐剩余记录
    fn partial_or_err(
        err: RepositoryError,
        conversation_id: ConversationId,
        target: &'static str,
    ) -> Result<u64, ApplicationError> {
        let applied = err.applied();
        if applied == 0 {
            tracing::error!(
                conversation_id = %conversation_id,
                target,
                error = %err,
                "送达状态更新失败"
            );
            return Err(err.into());
        }

        tracing::warn!(
            conversation_id = %conversation_id,
            target,
            applied,
            error = %err,
            "送达状态只部分更新"
        );
        Ok(applied)
    }
}
