use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{stream::SplitSink, SinkExt};
use opfeed_core::error::{OpfeedError, Result};
use opfeed_fanout::{Transport, WireFrame};

pub type WsSink = SplitSink<WebSocket, Message>;

/// Write half of an upgraded viewer socket.
pub struct WsTransport {
    sink: WsSink,
}

impl WsTransport {
    pub fn new(sink: WsSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: WireFrame) -> Result<()> {
        let msg = match frame {
            WireFrame::Text(json) => Message::Text(json.into()),
            WireFrame::Ping => Message::Ping(Default::default()),
        };
        self.sink
            .send(msg)
            .await
            .map_err(|e| OpfeedError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}
