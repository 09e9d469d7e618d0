//! 聊天会话核心领域模型
//!
//! 包含会话、消息、送达状态等核心实体，以及实时通道上的事件定义。

pub mod conversation;
pub mod errors;
pub mod events;
pub mod message;
pub mod value_objects;

// 重新导出常用类型
pub use conversation::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use value_objects::*;
