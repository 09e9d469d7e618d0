mod chat_service;

#[cfg(test)]
mod chat_service_tests;

pub use chat_service::{ChatService, ChatServiceDependencies, SendMessageRequest};
