use domain::{DomainError, ErrorCode, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("authentication failed: {0}")]
    Authentication(&'static str),
}

/// 面向传输层的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Unauthorized,
    Storage,
}

impl ApplicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(DomainError::InvalidArgument { .. }) => ErrorKind::Validation,
            Self::Domain(DomainError::ConversationNotFound) => ErrorKind::NotFound,
            Self::Domain(DomainError::NotParticipant) => ErrorKind::Forbidden,
            Self::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            Self::Repository(_) => ErrorKind::Storage,
            Self::Authentication(_) => ErrorKind::Unauthorized,
        }
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => ErrorCode::Validation,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::Forbidden => ErrorCode::Forbidden,
            ErrorKind::Unauthorized => ErrorCode::Unauthorized,
            ErrorKind::Storage => ErrorCode::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_onto_taxonomy() {
        let cases = [
            (
                ApplicationError::from(DomainError::invalid_argument("body", "empty")),
                ErrorKind::Validation,
            ),
            (
                ApplicationError::from(DomainError::ConversationNotFound),
                ErrorKind::NotFound,
            ),
            (
                ApplicationError::from(DomainError::NotParticipant),
                ErrorKind::Forbidden,
            ),
            (
                ApplicationError::from(RepositoryError::storage("down")),
                ErrorKind::Storage,
            ),
            (
                ApplicationError::from(RepositoryError::interrupted(2, "down")),
                ErrorKind::Storage,
            ),
            (
                ApplicationError::Authentication("missing token"),
                ErrorKind::Unauthorized,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.kind(), expected, "{error}");
        }
    }
}
