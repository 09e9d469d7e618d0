#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    repository::memory::{InMemoryConversationDirectory, InMemoryMessageRepository},
    LocalRoomBroadcaster, SystemClock,
};
use domain::{Conversation, ConversationId, UserId};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;
use web_api::{router, AppState, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// 在随机端口上运行的完整路由，仓储与应用目录都在内存中
pub struct TestServer {
    pub addr: SocketAddr,
    pub conversation: Conversation,
    pub directory: Arc<InMemoryConversationDirectory>,
    jwt: Arc<JwtService>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let directory = Arc::new(InMemoryConversationDirectory::new());
        let conversation = Conversation::new(
            ConversationId::from(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
        );
        directory.insert(conversation).await;

        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "integration-test-secret-with-32-plus-chars".to_string(),
            expiration_hours: 1,
        }));
        let state = AppState::assemble(
            Arc::new(InMemoryMessageRepository::new()),
            directory.clone(),
            Arc::new(SystemClock),
            Arc::new(LocalRoomBroadcaster::new(64)),
            jwt.clone(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state);
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            conversation,
            directory,
            jwt,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn a(&self) -> Uuid {
        self.conversation.initiator.into()
    }

    pub fn b(&self) -> Uuid {
        self.conversation.counterparty.into()
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation.id.into()
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn messages_url(&self) -> String {
        self.http(&format!(
            "/api/v1/conversations/{}/messages",
            self.conversation_id()
        ))
    }

    pub fn read_url(&self) -> String {
        self.http(&format!("/api/v1/conversations/{}/read", self.conversation_id()))
    }

    pub fn token(&self, user_id: Uuid) -> String {
        self.jwt.generate_token(user_id).expect("token")
    }

    pub fn bearer(&self, user_id: Uuid) -> String {
        format!("Bearer {}", self.token(user_id))
    }

    pub async fn connect(&self, user_id: Uuid) -> WsClient {
        let url = format!("ws://{}/api/v1/ws?token={}", self.addr, self.token(user_id));
        let (ws, _) = connect_async(url).await.expect("websocket connect");
        ws
    }

    /// 发送 join 并等待 presenceSnapshot，确保服务端已登记在线状态
    pub async fn join(&self, ws: &mut WsClient) -> Value {
        send_event(
            ws,
            json!({"event": "join", "data": {"conversationId": self.conversation_id()}}),
        )
        .await;
        next_event(ws, "presenceSnapshot").await
    }

    pub async fn send_message(&self, sender: Uuid, body: &str) -> Value {
        let response = reqwest::Client::new()
            .post(self.messages_url())
            .header("authorization", self.bearer(sender))
            .json(&json!({ "body": body }))
            .send()
            .await
            .expect("send message");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        response.json().await.expect("message json")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_event(ws: &mut WsClient, event: Value) {
    ws.send(TungsteniteMessage::text(event.to_string()))
        .await
        .expect("send frame");
}

/// 读取帧直到出现指定事件，跳过其他事件
pub async fn next_event(ws: &mut WsClient, name: &str) -> Value {
    timeout(EVENT_TIMEOUT, async {
        loop {
            let frame = ws
                .next()
                .await
                .expect("connection closed")
                .expect("frame");
            if let TungsteniteMessage::Text(text) = frame {
                let value: Value = serde_json::from_str(text.as_str()).expect("event json");
                if value["event"] == name {
                    return value;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for `{name}`"))
}

/// 在给定时间内没有收到指定事件
pub async fn assert_no_event(ws: &mut WsClient, name: &str, wait: Duration) {
    let result = timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => {
                    let value: Value = serde_json::from_str(text.as_str()).expect("event json");
                    if value["event"] == name {
                        return value;
                    }
                }
                Some(Ok(_)) => {}
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;

    if let Ok(value) = result {
        panic!("unexpected `{name}` event: {value}");
    }
}
