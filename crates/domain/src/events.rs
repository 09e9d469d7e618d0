//! 实时通道事件
//!
//! 客户端与服务端之间的 JSON 文本帧格式：`{"event": "...", "data": {...}}`。

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::value_objects::{ConversationId, Timestamp, UserId};

/// 客户端 → 服务端
///
/// 会话 ID 保留原始字符串，格式校验由网关负责（非法 ID 只记录日志，不回复）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    Join { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    Leave { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    Typing {
        conversation_id: String,
        display_name: String,
    },
    #[serde(rename_all = "camelCase")]
    StopTyping { conversation_id: String },
}

impl ClientEvent {
    pub fn raw_conversation_id(&self) -> &str {
        match self {
            Self::Join { conversation_id }
            | Self::Leave { conversation_id }
            | Self::Typing {
                conversation_id, ..
            }
            | Self::StopTyping { conversation_id } => conversation_id,
        }
    }
}

/// 通道上暴露给客户端的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NotFound,
    Forbidden,
    Unauthorized,
    Storage,
}

/// 服务端 → 客户端
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    ReceiveMessage(Message),
    #[serde(rename_all = "camelCase")]
    MessagesDelivered { conversation_id: ConversationId },
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        conversation_id: ConversationId,
        reader_id: UserId,
        read_at: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantOnline {
        conversation_id: ConversationId,
        participant_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantOffline {
        conversation_id: ConversationId,
        participant_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantTyping {
        conversation_id: ConversationId,
        participant_id: UserId,
        display_name: String,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantStopTyping {
        conversation_id: ConversationId,
        participant_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    PresenceSnapshot {
        conversation_id: ConversationId,
        members: Vec<UserId>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        conversation_id: Option<ConversationId>,
        code: ErrorCode,
    },
}
