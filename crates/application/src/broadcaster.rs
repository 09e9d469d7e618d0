use async_trait::async_trait;
use domain::{ConversationId, ServerEvent};
use thiserror::Error;

use crate::gateway::ConnectionId;

/// 发往某个会话房间的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomBroadcast {
    pub conversation_id: ConversationId,
    /// 不投递给该连接（"房间内其他人"语义）
    pub exclude: Option<ConnectionId>,
    pub event: ServerEvent,
}

impl RoomBroadcast {
    /// 投递给房间内所有连接
    pub fn room(conversation_id: ConversationId, event: ServerEvent) -> Self {
        Self {
            conversation_id,
            exclude: None,
            event,
        }
    }

    /// 投递给房间内除 `origin` 之外的连接
    pub fn others(conversation_id: ConversationId, origin: ConnectionId, event: ServerEvent) -> Self {
        Self {
            conversation_id,
            exclude: Some(origin),
            event,
        }
    }
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[async_trait]
pub trait RoomBroadcaster: Send + Sync {
    async fn broadcast(&self, payload: RoomBroadcast) -> Result<(), BroadcastError>;

    /// 发出即忘：失败只记录日志，不重试也不回滚已写入的数据
    async fn publish(&self, payload: RoomBroadcast) {
        let conversation_id = payload.conversation_id;
        if let Err(err) = self.broadcast(payload).await {
            tracing::warn!(
                conversation_id = %conversation_id,
                error = %err,
                "房间广播失败"
            );
        }
    }
}
