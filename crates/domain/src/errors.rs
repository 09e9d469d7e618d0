//! 领域模型错误定义
//!
//! 区分输入/成员规则错误与存储层错误，应用层再据此映射到统一的错误分类。

use thiserror::Error;

/// 领域规则错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 输入校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 会话无法通过应用目录解析
    #[error("conversation not found")]
    ConversationNotFound,

    /// 调用者不是会话的两方之一
    #[error("requester is not a participant of the conversation")]
    NotParticipant,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("storage failure: {message}")]
    Storage { message: String },

    /// 批量更新中途失败，`applied` 条记录已经生效
    #[error("storage interrupted after {applied} row(s): {message}")]
    Interrupted { applied: u64, message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn interrupted(applied: u64, message: impl Into<String>) -> Self {
        Self::Interrupted {
            applied,
            message: message.into(),
        }
    }

    /// 失败前已经生效的行数
    pub fn applied(&self) -> u64 {
        match self {
            Self::Interrupted { applied, .. } => *applied,
            _ => 0,
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
