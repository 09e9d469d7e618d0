//! 聊天服务单元测试
//!
//! 覆盖发送时的初始状态、加入房间后的送达升级、已读回执以及访问控制。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Conversation, ConversationId, DeliveryState, RepositoryError, ServerEvent, UserId};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::{ChatService, ChatServiceDependencies, SendMessageRequest};
use crate::{
    authorization::AuthorizationGuard,
    broadcaster::{BroadcastError, RoomBroadcast, RoomBroadcaster},
    clock::SystemClock,
    delivery::DeliveryStateMachine,
    error::ErrorKind,
    gateway::{ConnectionState, ConversationGateway, Outbound},
    presence::PresenceRegistry,
    repository::{
        memory::{InMemoryConversationDirectory, InMemoryMessageRepository},
        ConversationDirectory,
    },
    store::MessageStore,
};

/// 记录所有广播的测试广播器
#[derive(Default)]
struct RecordingBroadcaster {
    sent: Mutex<Vec<RoomBroadcast>>,
}

#[async_trait]
impl RoomBroadcaster for RecordingBroadcaster {
    async fn broadcast(&self, payload: RoomBroadcast) -> Result<(), BroadcastError> {
        self.sent.lock().await.push(payload);
        Ok(())
    }
}

struct FailingBroadcaster;

#[async_trait]
impl RoomBroadcaster for FailingBroadcaster {
    async fn broadcast(&self, _payload: RoomBroadcast) -> Result<(), BroadcastError> {
        Err(BroadcastError::failed("no transport"))
    }
}

/// 查询时先停住，直到测试放行
struct GatedDirectory {
    inner: InMemoryConversationDirectory,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ConversationDirectory for GatedDirectory {
    async fn find(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.find(conversation_id).await
    }
}

struct TestContext {
    service: ChatService,
    gateway: ConversationGateway,
    broadcaster: Arc<RecordingBroadcaster>,
    conversation: Conversation,
}

impl TestContext {
    fn a(&self) -> UserId {
        self.conversation.initiator
    }

    fn b(&self) -> UserId {
        self.conversation.counterparty
    }

    fn send(&self, sender: UserId, body: &str) -> SendMessageRequest {
        SendMessageRequest {
            conversation_id: self.conversation.id.into(),
            sender_id: sender.into(),
            body: body.to_string(),
        }
    }

    /// 通过网关加入房间，并把房间出站事件也记进广播器
    async fn join(&self, participant: UserId) -> ConnectionState {
        let mut conn = ConnectionState::new(participant);
        let out = self
            .gateway
            .handle(
                &mut conn,
                domain::ClientEvent::Join {
                    conversation_id: self.conversation.id.to_string(),
                },
            )
            .await;
        for outbound in out {
            if let Outbound::Room(broadcast) = outbound {
                self.broadcaster.publish(broadcast).await;
            }
        }
        conn
    }

    async fn received_by(&self, conn: &ConnectionState) -> Vec<ServerEvent> {
        self.broadcaster
            .sent
            .lock()
            .await
            .iter()
            .filter(|b| conn.accepts(b))
            .map(|b| b.event.clone())
            .collect()
    }

    async fn clear(&self) {
        self.broadcaster.sent.lock().await.clear();
    }
}

async fn setup_with(broadcaster: Arc<dyn RoomBroadcaster>) -> (ChatService, ConversationGateway, Conversation) {
    let directory = Arc::new(InMemoryConversationDirectory::new());
    let conversation = Conversation::new(
        ConversationId::from(Uuid::new_v4()),
        UserId::from(Uuid::new_v4()),
        UserId::from(Uuid::new_v4()),
    );
    directory.insert(conversation).await;

    let guard = Arc::new(AuthorizationGuard::new(directory));
    let presence = Arc::new(PresenceRegistry::new());
    let store = Arc::new(MessageStore::new(
        Arc::new(InMemoryMessageRepository::new()),
        guard.clone(),
        Arc::new(SystemClock),
    ));
    let delivery = Arc::new(DeliveryStateMachine::new(presence.clone(), store.clone()));

    let gateway = ConversationGateway::new(presence.clone(), guard, delivery.clone());
    let service = ChatService::new(ChatServiceDependencies {
        store,
        delivery,
        presence,
        broadcaster,
    });
    (service, gateway, conversation)
}

async fn setup() -> TestContext {
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let (service, gateway, conversation) = setup_with(broadcaster.clone()).await;
    TestContext {
        service,
        gateway,
        broadcaster,
        conversation,
    }
}

#[tokio::test]
async fn send_while_both_present_is_delivered_and_broadcast() {
    let ctx = setup().await;
    let _a = ctx.join(ctx.a()).await;
    let b = ctx.join(ctx.b()).await;
    ctx.clear().await;

    let message = ctx.service.send_message(ctx.send(ctx.a(), "hello")).await.unwrap();

    assert_eq!(message.state, DeliveryState::Delivered);
    assert_eq!(
        ctx.received_by(&b).await,
        vec![ServerEvent::ReceiveMessage(message)]
    );
}

#[tokio::test]
async fn send_while_offline_then_join_upgrades_to_delivered() {
    let ctx = setup().await;
    let a = ctx.join(ctx.a()).await;

    let message = ctx.service.send_message(ctx.send(ctx.a(), "hello")).await.unwrap();
    assert_eq!(message.state, DeliveryState::Sent);
    ctx.clear().await;

    let b = ctx.join(ctx.b()).await;

    let expected = ServerEvent::MessagesDelivered {
        conversation_id: ctx.conversation.id,
    };
    assert!(ctx.received_by(&a).await.contains(&expected));
    assert!(ctx.received_by(&b).await.contains(&expected));
    let delivered_events = ctx
        .received_by(&a)
        .await
        .into_iter()
        .filter(|e| *e == expected)
        .count();
    assert_eq!(delivered_events, 1);

    let history = ctx
        .service
        .list_messages(ctx.conversation.id.into(), ctx.b().into())
        .await
        .unwrap();
    assert_eq!(history[0].state, DeliveryState::Delivered);
}

#[tokio::test]
async fn read_receipt_notifies_sender() {
    let ctx = setup().await;
    let a = ctx.join(ctx.a()).await;
    let _b = ctx.join(ctx.b()).await;
    ctx.service.send_message(ctx.send(ctx.a(), "hello")).await.unwrap();
    ctx.clear().await;

    let updated = ctx
        .service
        .mark_read(ctx.conversation.id.into(), ctx.b().into())
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let events = ctx.received_by(&a).await;
    let [ServerEvent::MessagesRead {
        reader_id, read_at, ..
    }] = events.as_slice()
    else {
        panic!("expected messagesRead, got {events:?}");
    };
    assert_eq!(*reader_id, ctx.b());

    let history = ctx
        .service
        .list_messages(ctx.conversation.id.into(), ctx.a().into())
        .await
        .unwrap();
    assert_eq!(history[0].state, DeliveryState::Read);
    assert_eq!(history[0].read_at, Some(*read_at));

    // 第二次没有新消息，不再广播
    ctx.clear().await;
    let updated = ctx
        .service
        .mark_read(ctx.conversation.id.into(), ctx.b().into())
        .await
        .unwrap();
    assert_eq!(updated, 0);
    assert!(ctx.broadcaster.sent.lock().await.is_empty());
}

#[tokio::test]
async fn non_participant_is_forbidden_everywhere() {
    let ctx = setup().await;
    let outsider = UserId::from(Uuid::new_v4());
    ctx.service.send_message(ctx.send(ctx.a(), "secret")).await.unwrap();

    for body in ["valid body", ""] {
        let err = ctx.service.send_message(ctx.send(outsider, body)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    let err = ctx
        .service
        .list_messages(ctx.conversation.id.into(), outsider.into())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = ctx
        .service
        .mark_read(ctx.conversation.id.into(), outsider.into())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = ctx
        .service
        .presence_snapshot(ctx.conversation.id.into(), outsider.into())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let ctx = setup().await;
    let err = ctx
        .service
        .list_messages(Uuid::new_v4(), ctx.a().into())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn empty_body_is_rejected_for_participants() {
    let ctx = setup().await;
    let err = ctx
        .service
        .send_message(ctx.send(ctx.a(), " \t "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn broadcast_failure_does_not_lose_the_message() {
    let (service, _gateway, conversation) = setup_with(Arc::new(FailingBroadcaster)).await;

    let message = service
        .send_message(SendMessageRequest {
            conversation_id: conversation.id.into(),
            sender_id: conversation.initiator.into(),
            body: "still stored".into(),
        })
        .await
        .unwrap();

    let history = service
        .list_messages(conversation.id.into(), conversation.counterparty.into())
        .await
        .unwrap();
    assert_eq!(history, vec![message]);
}

#[tokio::test]
async fn presence_snapshot_reflects_room_members() {
    let ctx = setup().await;
    assert!(ctx
        .service
        .presence_snapshot(ctx.conversation.id.into(), ctx.a().into())
        .await
        .unwrap()
        .is_empty());

    let _b = ctx.join(ctx.b()).await;
    assert_eq!(
        ctx.service
            .presence_snapshot(ctx.conversation.id.into(), ctx.a().into())
            .await
            .unwrap(),
        vec![ctx.b()]
    );
}

#[tokio::test]
async fn presence_is_checked_after_the_participant_lookup() {
    let inner = InMemoryConversationDirectory::new();
    let conversation = Conversation::new(
        ConversationId::from(Uuid::new_v4()),
        UserId::from(Uuid::new_v4()),
        UserId::from(Uuid::new_v4()),
    );
    inner.insert(conversation).await;
    let directory = Arc::new(GatedDirectory {
        inner,
        entered: Notify::new(),
        release: Notify::new(),
    });

    let presence = Arc::new(PresenceRegistry::new());
    let store = Arc::new(MessageStore::new(
        Arc::new(InMemoryMessageRepository::new()),
        Arc::new(AuthorizationGuard::new(directory.clone())),
        Arc::new(SystemClock),
    ));
    let service = Arc::new(ChatService::new(ChatServiceDependencies {
        store: store.clone(),
        delivery: Arc::new(DeliveryStateMachine::new(presence.clone(), store)),
        presence: presence.clone(),
        broadcaster: Arc::new(RecordingBroadcaster::default()),
    }));

    let send = tokio::spawn({
        let service = service.clone();
        async move {
            service
                .send_message(SendMessageRequest {
                    conversation_id: conversation.id.into(),
                    sender_id: conversation.initiator.into(),
                    body: "hello".into(),
                })
                .await
        }
    });

    // 对方在参与者查询期间加入
    directory.entered.notified().await;
    presence.join(conversation.id, conversation.counterparty);
    directory.release.notify_one();

    let stored = send.await.unwrap().unwrap();
    assert_eq!(stored.state, DeliveryState::Delivered);
}
