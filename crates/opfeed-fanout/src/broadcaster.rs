use opfeed_core::event::Event;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ingress::IngressReceiver;
use crate::registry::{Delivery, Registry};

/// Per-event delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub subscribers: usize,
    pub delivered: usize,
    pub dropped: usize,
}

/// Single consumer of the ingress. Copies each event into every registered
/// queue with `try_send`: a full queue loses that event, nobody waits.
pub struct Broadcaster {
    registry: Arc<Registry>,
    ingress: IngressReceiver,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>, ingress: IngressReceiver) -> Self {
        Self { registry, ingress }
    }

    /// Drain the ingress until every producer handle is gone.
    pub async fn run(mut self) {
        info!("broadcaster started");
        while let Some(event) = self.ingress.recv().await {
            self.fanout(event);
        }
        info!("ingress closed, broadcaster stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Deliver one event to the subscribers registered right now.
    pub fn fanout(&self, event: Event) -> FanoutReport {
        let event = Arc::new(event);
        let subscribers = self.registry.snapshot();
        let mut report = FanoutReport {
            subscribers: subscribers.len(),
            ..FanoutReport::default()
        };

        for sub in &subscribers {
            match sub.try_deliver(&event) {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Dropped => {
                    report.dropped += 1;
                    debug!(conn_id = %sub.id(), kind = %event.kind(), "subscriber queue full, event dropped");
                }
                Delivery::Closed => {}
            }
        }

        debug!(
            kind = %event.kind(),
            id = event.id,
            subscribers = report.subscribers,
            delivered = report.delivered,
            dropped = report.dropped,
            "fanout"
        );
        report
    }
}
