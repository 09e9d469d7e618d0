//! 应用层实现。
//!
//! 围绕会话消息的用例服务：消息存储、在线状态、送达状态机、
//! 实时网关以及对外部协作方（应用目录、身份、广播）的抽象。

pub mod authorization;
pub mod broadcaster;
pub mod clock;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod local_broadcast;
pub mod presence;
pub mod repository;
pub mod services;
pub mod store;

pub use authorization::AuthorizationGuard;
pub use broadcaster::{BroadcastError, RoomBroadcast, RoomBroadcaster};
pub use clock::{Clock, FixedClock, SystemClock};
pub use delivery::{DeliveryStateMachine, ReadReceipt};
pub use error::{ApplicationError, ErrorKind};
pub use gateway::{ConnectionId, ConnectionState, ConversationGateway, Outbound};
pub use local_broadcast::{LocalRoomBroadcaster, RoomStream};
pub use presence::PresenceRegistry;
pub use repository::{ConversationDirectory, MessageRepository};
pub use services::{ChatService, ChatServiceDependencies, SendMessageRequest};
pub use store::{MessageStore, ReadUpdate};
