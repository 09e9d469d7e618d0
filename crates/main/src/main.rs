//! 主应用程序入口
//!
//! 加载配置、连接数据库并执行迁移，组装用例服务后启动 Axum Web API。

use std::sync::Arc;

use application::{LocalRoomBroadcaster, SystemClock};
use axum::http::HeaderValue;
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load_validated()?;
    if config.server.allow_insecure_defaults {
        tracing::warn!("allow_insecure_defaults 已开启，仅用于本地开发");
    }

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').last().unwrap_or("unknown")
    );
    let infrastructure = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
    })
    .await?;

    let state = AppState::assemble(
        infrastructure.message_repository(),
        infrastructure.conversation_directory(),
        Arc::new(SystemClock),
        Arc::new(LocalRoomBroadcaster::new(config.broadcast.capacity)),
        Arc::new(JwtService::new(config.jwt.clone())),
    );

    let app = router(state)
        .layer(cors_layer(config.server.cors_origin.as_deref())?)
        .layer(TraceLayer::new_for_http());

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("聊天服务启动在 http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    Ok(match origin {
        Some(origin) => layer.allow_origin(origin.parse::<HeaderValue>()?),
        None => layer.allow_origin(Any),
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，开始优雅关闭");
}
