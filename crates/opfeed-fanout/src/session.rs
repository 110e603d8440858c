use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use opfeed_core::config::FanoutConfig;
use opfeed_core::error::Result;
use opfeed_core::types::ConnId;
use opfeed_protocol::frames::EventFrame;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{Registry, Subscription};

/// Outbound unit handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// Serialized [`EventFrame`].
    Text(String),
    /// Keepalive control frame.
    Ping,
}

/// Write half of a viewer connection.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: WireFrame) -> Result<()>;

    /// Release the connection. Errors are irrelevant at this point.
    async fn close(&mut self);
}

/// Session states: linear progression, no backwards transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Why a session left `Active` (or never reached it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Process shutdown.
    Shutdown,
    /// The viewer closed the connection or its read half ended.
    RemoteClosed,
    /// A write (event or keepalive) failed.
    Transport(String),
    /// The queue's sending side vanished from the registry.
    Detached,
    /// Registration failed; no registry entry was created.
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub capacity: usize,
    pub keepalive: Duration,
}

impl From<&FanoutConfig> for SessionConfig {
    fn from(cfg: &FanoutConfig) -> Self {
        Self {
            capacity: cfg.subscriber_capacity,
            keepalive: cfg.keepalive_interval(),
        }
    }
}

/// One viewer connection: registers, pumps events and keepalives to the
/// transport, and deregisters on every exit path.
pub struct Session {
    id: ConnId,
    registry: Arc<Registry>,
    config: SessionConfig,
    shutdown: CancellationToken,
    state: SessionState,
}

impl Session {
    pub fn new(
        id: ConnId,
        registry: Arc<Registry>,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            registry,
            config,
            shutdown,
            state: SessionState::Connecting,
        }
    }

    /// Drive the session to `Closed`.
    ///
    /// `inbound` is the read half of the connection; its items are ignored
    /// and its end is treated as the viewer going away.
    pub async fn run<T, S>(mut self, mut transport: T, mut inbound: S) -> CloseReason
    where
        T: Transport,
        S: Stream + Unpin + Send,
        S::Item: Send,
    {
        let mut subscription = match self
            .registry
            .subscribe(self.id.clone(), self.config.capacity)
        {
            Ok(sub) => sub,
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "registration failed");
                transport.close().await;
                self.transition(SessionState::Closed);
                return CloseReason::Rejected(e.to_string());
            }
        };
        self.transition(SessionState::Active);

        let reason = self
            .pump(&mut subscription, &mut transport, &mut inbound)
            .await;

        self.transition(SessionState::Closing);
        drop(subscription);
        transport.close().await;
        self.transition(SessionState::Closed);

        info!(conn_id = %self.id, reason = ?reason, "session closed");
        reason
    }

    async fn pump<T, S>(
        &self,
        subscription: &mut Subscription,
        transport: &mut T,
        inbound: &mut S,
    ) -> CloseReason
    where
        T: Transport,
        S: Stream + Unpin + Send,
        S::Item: Send,
    {
        let period = self.config.keepalive;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut seq: u64 = 0;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return CloseReason::Shutdown,
                _ = keepalive.tick() => {
                    if let Err(e) = transport.send(WireFrame::Ping).await {
                        debug!(conn_id = %self.id, error = %e, "keepalive failed");
                        return CloseReason::Transport(e.to_string());
                    }
                }
                event = subscription.recv() => {
                    let Some(event) = event else {
                        return CloseReason::Detached;
                    };
                    seq += 1;
                    let frame = EventFrame::from_event(&event).with_seq(seq);
                    if let Err(e) = transport.send(WireFrame::Text(frame.to_json())).await {
                        warn!(conn_id = %self.id, error = %e, "event delivery failed");
                        return CloseReason::Transport(e.to_string());
                    }
                }
                msg = inbound.next() => {
                    if msg.is_none() {
                        return CloseReason::RemoteClosed;
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(conn_id = %self.id, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}
