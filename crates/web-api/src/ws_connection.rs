use application::{ConnectionState, Outbound, RoomBroadcaster, RoomStream};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ServerEvent, UserId};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};

use crate::state::AppState;

type WsSender = SplitSink<WebSocket, WsMessage>;

/// WebSocket 连接
///
/// 单个任务内同时处理客户端帧和房间广播，房间集合的修改
/// 总是先于之后到达的广播生效。断开时统一清理在线状态。
pub struct WebSocketConnection {
    state: AppState,
    conn: ConnectionState,
    stream: RoomStream,
}

/// 客户端帧的处理结果
enum Incoming {
    Event(ClientEvent),
    Pong(axum::body::Bytes),
    Ignore,
    Close,
}

impl WebSocketConnection {
    /// 在升级完成前订阅广播
    pub fn new(state: AppState, participant_id: UserId) -> Self {
        let stream = state.broadcaster.subscribe();
        Self {
            state,
            conn: ConnectionState::new(participant_id),
            stream,
        }
    }

    pub async fn run(mut self, socket: WebSocket) {
        tracing::info!(
            connection_id = %self.conn.id,
            participant_id = %self.conn.participant_id,
            "WebSocket 连接已建立"
        );
        let (mut sender, mut incoming) = socket.split();

        loop {
            tokio::select! {
                frame = incoming.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(err)) => {
                            tracing::debug!(error = %err, "WebSocket 读取失败");
                            break;
                        }
                        None => break,
                    };
                    match Self::parse(frame) {
                        Incoming::Event(event) => {
                            let outbound = self.state.gateway.handle(&mut self.conn, event).await;
                            if !self.dispatch(&mut sender, outbound).await {
                                break;
                            }
                        }
                        Incoming::Pong(data) => {
                            if sender.send(WsMessage::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Incoming::Ignore => {}
                        Incoming::Close => break,
                    }
                }
                broadcast = self.stream.recv() => {
                    let Some(broadcast) = broadcast else { break };
                    if !self.conn.accepts(&broadcast) {
                        continue;
                    }
                    if !Self::send_event(&mut sender, &broadcast.event).await {
                        break;
                    }
                }
            }
        }

        // 连接断开时清理在线状态并通知房间
        let outbound = self.state.gateway.disconnect(&mut self.conn);
        for item in outbound {
            if let Outbound::Room(broadcast) = item {
                self.state.broadcaster.publish(broadcast).await;
            }
        }
        tracing::info!(
            connection_id = %self.conn.id,
            participant_id = %self.conn.participant_id,
            "WebSocket 连接已断开，在线状态已清理"
        );
    }

    fn parse(frame: WsMessage) -> Incoming {
        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => Incoming::Event(event),
                Err(err) => {
                    tracing::warn!(error = %err, "无法解析的客户端事件");
                    Incoming::Ignore
                }
            },
            WsMessage::Ping(data) => Incoming::Pong(data),
            WsMessage::Pong(_) | WsMessage::Binary(_) => Incoming::Ignore,
            WsMessage::Close(_) => Incoming::Close,
        }
    }

    /// 回复发给本连接，房间事件交给广播器（本连接也会按房间过滤后收到）
    async fn dispatch(&self, sender: &mut WsSender, outbound: Vec<Outbound>) -> bool {
        for item in outbound {
            match item {
                Outbound::Reply(event) => {
                    if !Self::send_event(sender, &event).await {
                        return false;
                    }
                }
                Outbound::Room(broadcast) => self.state.broadcaster.publish(broadcast).await,
            }
        }
        true
    }

    async fn send_event(sender: &mut WsSender, event: &ServerEvent) -> bool {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize websocket payload");
                return true;
            }
        };
        sender.send(WsMessage::Text(payload.into())).await.is_ok()
    }
}
