//! 会话实体
//!
//! 会话由外部的求职申请目录派生，本系统只读不写。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, UserId};

/// 两方会话：申请人与雇主
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    /// 发起方（申请人）
    pub initiator: UserId,
    /// 对方（雇主）
    pub counterparty: UserId,
}

impl Conversation {
    pub fn new(id: ConversationId, initiator: UserId, counterparty: UserId) -> Self {
        Self {
            id,
            initiator,
            counterparty,
        }
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.initiator == user_id || self.counterparty == user_id
    }

    /// 返回另一方；调用者不是参与者时返回 None
    pub fn other_party(&self, user_id: UserId) -> Option<UserId> {
        if self.initiator == user_id {
            Some(self.counterparty)
        } else if self.counterparty == user_id {
            Some(self.initiator)
        } else {
            None
        }
    }
}
