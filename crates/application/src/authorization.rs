//! 会话访问控制
//!
//! 只有会话的两方可以读写该会话；参与者关系来自外部应用目录。

use std::sync::Arc;

use domain::{Conversation, ConversationId, DomainError, UserId};

use crate::{error::ApplicationError, repository::ConversationDirectory};

pub struct AuthorizationGuard {
    directory: Arc<dyn ConversationDirectory>,
}

impl AuthorizationGuard {
    pub fn new(directory: Arc<dyn ConversationDirectory>) -> Self {
        Self { directory }
    }

    /// 解析会话并确认 `requester` 是参与者
    pub async fn require_participant(
        &self,
        conversation_id: ConversationId,
        requester: UserId,
    ) -> Result<Conversation, ApplicationError> {
        let conversation = self
            .directory
            .find(conversation_id)
            .await?
            .ok_or(DomainError::ConversationNotFound)?;

        if !conversation.is_participant(requester) {
            tracing::warn!(
                conversation_id = %conversation_id,
                requester = %requester,
                "非参与者尝试访问会话"
            );
            return Err(DomainError::NotParticipant.into());
        }

        Ok(conversation)
    }
}
