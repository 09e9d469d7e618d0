use std::sync::Arc;

use domain::{Conversation, ConversationId, Message, ServerEvent, UserId};
use uuid::Uuid;

use crate::{
    broadcaster::{RoomBroadcast, RoomBroadcaster},
    delivery::DeliveryStateMachine,
    error::ApplicationError,
    presence::PresenceRegistry,
    store::MessageStore,
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
}

pub struct ChatServiceDependencies {
    pub store: Arc<MessageStore>,
    pub delivery: Arc<DeliveryStateMachine>,
    pub presence: Arc<PresenceRegistry>,
    pub broadcaster: Arc<dyn RoomBroadcaster>,
}

/// 请求/响应式用例：发送、拉取历史、标记已读
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let conversation_id = ConversationId::from(request.conversation_id);
        let sender_id = UserId::from(request.sender_id);

        // 授权之后、写入前一刻检查对方是否在房间
        let delivery = &self.deps.delivery;
        let stored = self
            .deps
            .store
            .append_with(conversation_id, sender_id, request.body, |conversation| {
                delivery.initial_state(conversation.id, sender_id)
            })
            .await?;

        // 广播给房间内所有连接（包括发送者自己的其他连接）
        self.deps
            .broadcaster
            .publish(RoomBroadcast::room(
                conversation_id,
                ServerEvent::ReceiveMessage(stored.clone()),
            ))
            .await;

        Ok(stored)
    }

    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.deps
            .store
            .list_by_conversation(
                ConversationId::from(conversation_id),
                UserId::from(requester_id),
            )
            .await
    }

    /// 返回本次更新的消息条数
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<u64, ApplicationError> {
        let conversation_id = ConversationId::from(conversation_id);
        let receipt = self
            .deps
            .delivery
            .acknowledge_read(conversation_id, UserId::from(reader_id))
            .await?;

        if let Some(event) = receipt.event {
            self.deps
                .broadcaster
                .publish(RoomBroadcast::room(conversation_id, event))
                .await;
        }

        Ok(receipt.updated)
    }

    /// 只做参与者校验，供需要在解析请求体之前拒绝非参与者的调用方使用
    pub async fn authorize(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Conversation, ApplicationError> {
        self.deps
            .store
            .guard()
            .require_participant(
                ConversationId::from(conversation_id),
                UserId::from(requester_id),
            )
            .await
    }

    /// 当前在房间内的参与者
    pub async fn presence_snapshot(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Vec<UserId>, ApplicationError> {
        let conversation = self.authorize(conversation_id, requester_id).await?;
        Ok(self.deps.presence.members_of(conversation.id))
    }
}
