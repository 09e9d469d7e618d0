use std::sync::Arc;

use application::repository::{ConversationDirectory, MessageRepository};
use sqlx::PgPool;
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgConversationDirectory, PgMessageRepository},
};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub pool: PgPool,
    pub messages: Arc<PgMessageRepository>,
    pub directory: Arc<PgConversationDirectory>,
}

impl Infrastructure {
    /// 建立连接池并执行内嵌迁移
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(&config.database_url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(max_connections = config.max_connections, "数据库迁移完成");

        Ok(Self {
            messages: Arc::new(PgMessageRepository::new(pool.clone())),
            directory: Arc::new(PgConversationDirectory::new(pool.clone())),
            pool,
        })
    }

    pub fn message_repository(&self) -> Arc<dyn MessageRepository> {
        self.messages.clone()
    }

    pub fn conversation_directory(&self) -> Arc<dyn ConversationDirectory> {
        self.directory.clone()
    }
}
