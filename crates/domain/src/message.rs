//! 消息实体定义
//!
//! 消息内容创建后不可变，只有送达状态会沿 `sent → delivered → read` 单向推进。

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, MessageBody, MessageId, Timestamp, UserId};

/// 消息送达状态，枚举顺序即推进顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// 已持久化，对方不在房间内
    Sent,
    /// 对方已在房间内，但尚未查看
    Delivered,
    /// 对方已确认查看
    Read,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(DomainError::invalid_argument(
                "state",
                format!("unknown delivery state `{other}`"),
            )),
        }
    }
}

/// 消息实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: MessageBody,
    pub state: DeliveryState,
    /// 仅在进入 `read` 时写入
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Message {
    /// 创建新消息，初始状态只能是 `sent` 或 `delivered`
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        body: MessageBody,
        initial_state: DeliveryState,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if initial_state == DeliveryState::Read {
            return Err(DomainError::invalid_argument(
                "state",
                "a new message cannot start as read",
            ));
        }
        Ok(Self {
            id,
            conversation_id,
            sender_id,
            body,
            state: initial_state,
            read_at: None,
            created_at,
        })
    }

    /// 从存储中还原消息，校验 `read_at` 与状态的一致性
    pub fn restore(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        body: MessageBody,
        state: DeliveryState,
        read_at: Option<Timestamp>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if (state == DeliveryState::Read) != read_at.is_some() {
            return Err(DomainError::invalid_argument(
                "read_at",
                "must be set exactly when state is read",
            ));
        }
        Ok(Self {
            id,
            conversation_id,
            sender_id,
            body,
            state,
            read_at,
            created_at,
        })
    }

    /// 将状态推进到 `target`。已处于或超过目标状态时不做任何修改，返回 false。
    pub fn advance_to(&mut self, target: DeliveryState, at: Timestamp) -> bool {
        if self.state >= target {
            return false;
        }
        self.state = target;
        if target == DeliveryState::Read {
            self.read_at = Some(at);
        }
        true
    }

    pub fn is_addressed_to(&self, participant: UserId) -> bool {
        self.sender_id != participant
    }
}
