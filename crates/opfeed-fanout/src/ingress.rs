use opfeed_core::error::{OpfeedError, Result};
use opfeed_core::event::Event;
use tokio::sync::mpsc;
use tracing::debug;

/// Producer-side handle: validates and hands events to the broadcaster.
/// Cloneable; the broadcaster stops once every clone is dropped.
#[derive(Debug, Clone)]
pub struct Ingress {
    tx: mpsc::Sender<Event>,
}

/// Broadcaster-side end of the ingress queue.
#[derive(Debug)]
pub struct IngressReceiver {
    rx: mpsc::Receiver<Event>,
}

impl IngressReceiver {
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

/// Bounded handoff between producers and the broadcaster.
pub fn channel(capacity: usize) -> (Ingress, IngressReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Ingress { tx }, IngressReceiver { rx })
}

impl Ingress {
    /// Parse, validate and forward a raw JSON submission.
    pub async fn submit_json(&self, raw: &[u8]) -> Result<()> {
        let event = Event::parse(raw)?;
        self.forward(event).await
    }

    /// Validate and forward an already-decoded event.
    ///
    /// Waits while the ingress queue is full: producers absorb the
    /// backpressure, viewers never do.
    pub async fn submit(&self, event: Event) -> Result<()> {
        event.validate()?;
        self.forward(event).await
    }

    async fn forward(&self, event: Event) -> Result<()> {
        debug!(kind = %event.kind(), id = event.id, "event accepted");
        self.tx
            .send(event)
            .await
            .map_err(|_| OpfeedError::IngressClosed)
    }
}
