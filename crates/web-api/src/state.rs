use std::sync::Arc;

use application::{
    AuthorizationGuard, ChatService, ChatServiceDependencies, Clock, ConversationDirectory,
    ConversationGateway, DeliveryStateMachine, LocalRoomBroadcaster, MessageRepository,
    MessageStore, PresenceRegistry,
};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub gateway: Arc<ConversationGateway>,
    pub broadcaster: Arc<LocalRoomBroadcaster>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        gateway: Arc<ConversationGateway>,
        broadcaster: Arc<LocalRoomBroadcaster>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            chat_service,
            gateway,
            broadcaster,
            jwt_service,
        }
    }

    /// 按仓储和目录组装全部用例组件。
    /// 在线状态表与广播器为进程内单例，REST 与 WebSocket 共用。
    pub fn assemble(
        message_repository: Arc<dyn MessageRepository>,
        directory: Arc<dyn ConversationDirectory>,
        clock: Arc<dyn Clock>,
        broadcaster: Arc<LocalRoomBroadcaster>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        let guard = Arc::new(AuthorizationGuard::new(directory));
        let presence = Arc::new(PresenceRegistry::new());
        let store = Arc::new(MessageStore::new(message_repository, guard.clone(), clock));
        let delivery = Arc::new(DeliveryStateMachine::new(presence.clone(), store.clone()));

        let gateway = Arc::new(ConversationGateway::new(
            presence.clone(),
            guard,
            delivery.clone(),
        ));
        let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
            store,
            delivery,
            presence,
            broadcaster: broadcaster.clone(),
        }));

        Self::new(chat_service, gateway, broadcaster, jwt_service)
    }
}
