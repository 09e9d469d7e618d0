//! 会话在线状态表
//!
//! 纯内存、单进程：conversation → 当前在房间内的参与者集合。
//! 同一参与者的多个连接折叠为一条记录；集合为空时整条记录删除。
//! 进程重启后清空，由客户端重新 join 恢复。

use std::collections::{HashMap, HashSet};

use domain::{ConversationId, UserId};
use parking_lot::Mutex;

#[derive(Default)]
struct PresenceTables {
    room_users: HashMap<ConversationId, HashSet<UserId>>,
    // 反向索引，断线清理时只需遍历该参与者所在的会话
    user_rooms: HashMap<UserId, HashSet<ConversationId>>,
}

/// 在线状态表，只由网关写入
#[derive(Default)]
pub struct PresenceRegistry {
    tables: Mutex<PresenceTables>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 参与者进入会话房间，已在房间内时不做修改
    pub fn join(&self, conversation_id: ConversationId, participant_id: UserId) {
        let mut tables = self.tables.lock();
        tables
            .room_users
            .entry(conversation_id)
            .or_default()
            .insert(participant_id);
        tables
            .user_rooms
            .entry(participant_id)
            .or_default()
            .insert(conversation_id);

        tracing::debug!(
            conversation_id = %conversation_id,
            participant_id = %participant_id,
            "参与者进入房间"
        );
    }

    /// 参与者离开会话房间，集合变空时删除整条记录
    pub fn leave(&self, conversation_id: ConversationId, participant_id: UserId) {
        let mut tables = self.tables.lock();
        Self::remove_locked(&mut tables, conversation_id, participant_id);
    }

    /// 房间内是否有除 `asking` 之外的成员
    pub fn is_other_present(&self, conversation_id: ConversationId, asking: UserId) -> bool {
        self.tables
            .lock()
            .room_users
            .get(&conversation_id)
            .map(|users| users.iter().any(|user| *user != asking))
            .unwrap_or(false)
    }

    /// 当前成员快照（可能为空），按 ID 排序保证输出稳定
    pub fn members_of(&self, conversation_id: ConversationId) -> Vec<UserId> {
        let mut members: Vec<UserId> = self
            .tables
            .lock()
            .room_users
            .get(&conversation_id)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// 断线清理：从所有会话移除该参与者，返回被移除的会话列表
    pub fn remove_from_all_conversations(&self, participant_id: UserId) -> Vec<ConversationId> {
        let mut tables = self.tables.lock();
        let mut rooms: Vec<ConversationId> = tables
            .user_rooms
            .get(&participant_id)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default();
        rooms.sort();

        for conversation_id in &rooms {
            Self::remove_locked(&mut tables, *conversation_id, participant_id);
        }

        if !rooms.is_empty() {
            tracing::info!(
                participant_id = %participant_id,
                rooms = rooms.len(),
                "清理参与者在线状态"
            );
        }
        rooms
    }

    /// 当前有成员的会话数
    pub fn active_conversations(&self) -> usize {
        self.tables.lock().room_users.len()
    }

    fn remove_locked(
        tables: &mut PresenceTables,
        conversation_id: ConversationId,
        participant_id: UserId,
    ) {
        if let Some(users) = tables.room_users.get_mut(&conversation_id) {
            users.remove(&participant_id);
            if users.is_empty() {
                tables.room_users.remove(&conversation_id);
            }
        }

        if let Some(rooms) = tables.user_rooms.get_mut(&participant_id) {
            rooms.remove(&conversation_id);
            if rooms.is_empty() {
                tables.user_rooms.remove(&participant_id);
            }
        }
    }
}
