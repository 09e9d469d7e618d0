//! 送达状态机
//!
//! 状态只沿 `sent → delivered → read` 前进：
//! - 发送时：对方在房间内则为 delivered，否则为 sent（时刻检查，不做事后修正）
//! - 加入房间时：对方发来的 sent 消息批量升级为 delivered
//! - 显式已读确认时：对方发来的 sent/delivered 消息批量升级为 read
//!
//! 已读只能来自显式确认，在房间内不代表已经看过。

use std::sync::Arc;

use domain::{Conversation, ConversationId, DeliveryState, ServerEvent, UserId};

use crate::{error::ApplicationError, presence::PresenceRegistry, store::MessageStore};

/// 一次已读确认的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub updated: u64,
    /// 有记录变化时需要广播的 `messagesRead`
    pub event: Option<ServerEvent>,
}

pub struct DeliveryStateMachine {
    presence: Arc<PresenceRegistry>,
    store: Arc<MessageStore>,
}

impl DeliveryStateMachine {
    pub fn new(presence: Arc<PresenceRegistry>, store: Arc<MessageStore>) -> Self {
        Self { presence, store }
    }

    /// 新消息的初始状态
    pub fn initial_state(&self, conversation_id: ConversationId, sender: UserId) -> DeliveryState {
        if self.presence.is_other_present(conversation_id, sender) {
            DeliveryState::Delivered
        } else {
            DeliveryState::Sent
        }
    }

    /// 参与者加入房间后的批量升级；每批最多产生一个 `messagesDelivered`
    pub async fn upgrade_on_join(
        &self,
        conversation: &Conversation,
        participant: UserId,
    ) -> Result<Option<ServerEvent>, ApplicationError> {
        let updated = self.store.mark_delivered(conversation, participant).await?;
        if updated == 0 {
            return Ok(None);
        }

        tracing::info!(
            conversation_id = %conversation.id,
            participant_id = %participant,
            updated,
            "消息升级为已送达"
        );
        Ok(Some(ServerEvent::MessagesDelivered {
            conversation_id: conversation.id,
        }))
    }

    /// 显式已读确认
    pub async fn acknowledge_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<ReadReceipt, ApplicationError> {
        let update = self.store.mark_read(conversation_id, reader).await?;
        let event = (update.updated > 0).then(|| ServerEvent::MessagesRead {
            conversation_id,
            reader_id: reader,
            read_at: update.read_at,
        });

        if update.updated > 0 {
            tracing::info!(
                conversation_id = %conversation_id,
                reader_id = %reader,
                updated = update.updated,
                complete = update.complete,
                "消息标记为已读"
            );
        }

        Ok(ReadReceipt {
            updated: update.updated,
            event,
        })
    }
}
