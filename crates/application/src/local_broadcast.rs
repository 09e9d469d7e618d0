// 进程内广播器，单实例部署使用
use crate::{broadcaster::BroadcastError, RoomBroadcast, RoomBroadcaster};
use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Clone)]
pub struct LocalRoomBroadcaster {
    sender: broadcast::Sender<RoomBroadcast>,
}

impl LocalRoomBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> RoomStream {
        RoomStream::new(self.sender.subscribe())
    }
}

impl Default for LocalRoomBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl RoomBroadcaster for LocalRoomBroadcaster {
    async fn broadcast(&self, payload: RoomBroadcast) -> Result<(), BroadcastError> {
        // 没有任何连接时直接丢弃
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(payload)
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        Ok(())
    }
}

// 单个连接的广播订阅
pub struct RoomStream {
    receiver: broadcast::Receiver<RoomBroadcast>,
}

impl RoomStream {
    pub fn new(receiver: broadcast::Receiver<RoomBroadcast>) -> Self {
        Self { receiver }
    }

    /// 下一条广播；落后时跳过丢失的部分，通道关闭时返回 None
    pub async fn recv(&mut self) -> Option<RoomBroadcast> {
        loop {
            match self.receiver.recv().await {
                Ok(broadcast) => return Some(broadcast),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "连接消费过慢，跳过部分广播");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
