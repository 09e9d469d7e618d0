//! 会话网关
//!
//! 实时通道的事件路由，与具体传输无关：每个处理函数接收
//! （连接状态, 客户端事件），更新房间成员与在线状态表，
//! 返回需要投递的出站事件，由传输层负责真正发送。
//!
//! 网关只提供在线事实，送达状态的变化由 [`DeliveryStateMachine`] 决定。

use std::{collections::HashSet, fmt, sync::Arc};

use domain::{ClientEvent, Conversation, ConversationId, ServerEvent, UserId};
use uuid::Uuid;

use crate::{
    authorization::AuthorizationGuard, broadcaster::RoomBroadcast, delivery::DeliveryStateMachine,
    error::ApplicationError, presence::PresenceRegistry,
};

/// 单个实时连接的标识（不是参与者标识）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 连接级状态：已认证的参与者与已加入的房间
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub id: ConnectionId,
    pub participant_id: UserId,
    pub rooms: HashSet<ConversationId>,
}

impl ConnectionState {
    pub fn new(participant_id: UserId) -> Self {
        Self {
            id: ConnectionId::generate(),
            participant_id,
            rooms: HashSet::new(),
        }
    }

    /// 该连接是否应收到这条房间广播
    pub fn accepts(&self, broadcast: &RoomBroadcast) -> bool {
        self.rooms.contains(&broadcast.conversation_id) && broadcast.exclude != Some(self.id)
    }
}

/// 出站事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// 只回复发起事件的连接
    Reply(ServerEvent),
    /// 投递到房间
    Room(RoomBroadcast),
}

pub struct ConversationGateway {
    presence: Arc<PresenceRegistry>,
    guard: Arc<AuthorizationGuard>,
    delivery: Arc<DeliveryStateMachine>,
}

impl ConversationGateway {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        guard: Arc<AuthorizationGuard>,
        delivery: Arc<DeliveryStateMachine>,
    ) -> Self {
        Self {
            presence,
            guard,
            delivery,
        }
    }

    /// 处理一条客户端事件
    pub async fn handle(&self, conn: &mut ConnectionState, event: ClientEvent) -> Vec<Outbound> {
        let conversation_id = match event.raw_conversation_id().parse::<ConversationId>() {
            Ok(id) => id,
            Err(_) => {
                // 非法 ID 只记录日志，不回复
                tracing::warn!(
                    connection_id = %conn.id,
                    raw = event.raw_conversation_id(),
                    "非法的会话 ID"
                );
                return Vec::new();
            }
        };

        let conversation = match self
            .guard
            .require_participant(conversation_id, conn.participant_id)
            .await
        {
            Ok(conversation) => conversation,
            Err(err) => return vec![error_reply(Some(conversation_id), &err)],
        };

        match event {
            ClientEvent::Join { .. } => self.join(conn, &conversation).await,
            ClientEvent::Leave { .. } => self.leave(conn, conversation_id),
            ClientEvent::Typing { display_name, .. } => {
                vec![Outbound::Room(RoomBroadcast::others(
                    conversation_id,
                    conn.id,
                    ServerEvent::ParticipantTyping {
                        conversation_id,
                        participant_id: conn.participant_id,
                        display_name,
                    },
                ))]
            }
            ClientEvent::StopTyping { .. } => {
                vec![Outbound::Room(RoomBroadcast::others(
                    conversation_id,
                    conn.id,
                    ServerEvent::ParticipantStopTyping {
                        conversation_id,
                        participant_id: conn.participant_id,
                    },
                ))]
            }
        }
    }

    /// 连接断开：从所有会话移除该参与者并通知对应房间
    pub fn disconnect(&self, conn: &mut ConnectionState) -> Vec<Outbound> {
        conn.rooms.clear();
        self.presence
            .remove_from_all_conversations(conn.participant_id)
            .into_iter()
            .map(|conversation_id| {
                Outbound::Room(RoomBroadcast::others(
                    conversation_id,
                    conn.id,
                    ServerEvent::ParticipantOffline {
                        conversation_id,
                        participant_id: conn.participant_id,
                    },
                ))
            })
            .collect()
    }

    async fn join(&self, conn: &mut ConnectionState, conversation: &Conversation) -> Vec<Outbound> {
        let conversation_id = conversation.id;
        let participant_id = conn.participant_id;

        conn.rooms.insert(conversation_id);
        self.presence.join(conversation_id, participant_id);
        tracing::info!(
            connection_id = %conn.id,
            conversation_id = %conversation_id,
            participant_id = %participant_id,
            "连接加入房间"
        );

        let mut outbound = vec![
            Outbound::Room(RoomBroadcast::others(
                conversation_id,
                conn.id,
                ServerEvent::ParticipantOnline {
                    conversation_id,
                    participant_id,
                },
            )),
            Outbound::Reply(ServerEvent::PresenceSnapshot {
                conversation_id,
                members: self.presence.members_of(conversation_id),
            }),
        ];

        match self.delivery.upgrade_on_join(conversation, participant_id).await {
            Ok(Some(event)) => outbound.push(Outbound::Room(RoomBroadcast::room(conversation_id, event))),
            Ok(None) => {}
            Err(err) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "加入房间后的送达升级失败"
                );
                outbound.push(error_reply(Some(conversation_id), &err));
            }
        }

        outbound
    }

    fn leave(&self, conn: &mut ConnectionState, conversation_id: ConversationId) -> Vec<Outbound> {
        conn.rooms.remove(&conversation_id);
        self.presence.leave(conversation_id, conn.participant_id);
        tracing::info!(
            connection_id = %conn.id,
            conversation_id = %conversation_id,
            "连接离开房间"
        );

        vec![Outbound::Room(RoomBroadcast::others(
            conversation_id,
            conn.id,
            ServerEvent::ParticipantOffline {
                conversation_id,
                participant_id: conn.participant_id,
            },
        ))]
    }
}

fn error_reply(conversation_id: Option<ConversationId>, err: &ApplicationError) -> Outbound {
    Outbound::Reply(ServerEvent::Error {
        conversation_id,
        code: err.kind().into(),
    })
}
