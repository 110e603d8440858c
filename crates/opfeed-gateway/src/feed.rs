//! Upstream operator feed: polls the PD RESTful API and pushes new events
//! into the ingress, the same way a producer posting to `/post` would.
//!
//! `GET http://{pd_addr}/api/v1/feed?offset={n}` returns a JSON array of
//! operator log records newer than `n` (see [`FeedEntry`]); the offset
//! advances to the largest `id` seen.

use opfeed_core::config::FeedConfig;
use opfeed_core::error::{OpfeedError, Result};
use opfeed_core::event::{Event, FeedEntry};
use opfeed_fanout::Ingress;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT_SECS: u64 = 5;

pub struct FeedPoller {
    client: reqwest::Client,
    pd_addr: String,
    interval: Duration,
    ingress: Ingress,
    offset: u64,
}

impl FeedPoller {
    pub fn new(config: &FeedConfig, ingress: Ingress) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| OpfeedError::Feed(e.to_string()))?;
        Ok(Self {
            client,
            pd_addr: config.pd_addr.trim_end_matches('/').to_string(),
            interval: config.poll_interval(),
            ingress,
            offset: 0,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn feed_url(&self) -> String {
        format!("http://{}/api/v1/feed?offset={}", self.pd_addr, self.offset)
    }

    /// Poll once per interval until shutdown. A failed poll is logged and
    /// the next one proceeds from the same offset.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(pd = %self.pd_addr, "feed poller started");
        let mut tick = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    match self.poll_once().await {
                        Ok(0) => {}
                        Ok(n) => debug!(accepted = n, offset = self.offset, "feed batch relayed"),
                        Err(OpfeedError::IngressClosed) => {
                            warn!("ingress closed, feed poller stopping");
                            break;
                        }
                        Err(e) => warn!(error = %e, "feed poll failed"),
                    }
                }
            }
        }
        info!(offset = self.offset(), "feed poller stopped");
    }

    /// Fetch one batch and relay it. Returns the number of events accepted.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let batch: Vec<Value> = self
            .client
            .get(self.feed_url())
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| OpfeedError::Feed(e.to_string()))?
            .json()
            .await
            .map_err(|e| OpfeedError::Feed(e.to_string()))?;
        self.relay(batch).await
    }

    /// Advance the offset past every entry and submit the valid ones.
    /// Invalid entries are skipped so they are not fetched again.
    async fn relay(&mut self, batch: Vec<Value>) -> Result<usize> {
        let mut accepted = 0;
        for raw in batch {
            if let Some(id) = raw.get("id").and_then(Value::as_u64) {
                self.offset = self.offset.max(id);
            }
            let event = match serde_json::from_value::<FeedEntry>(raw)
                .map_err(OpfeedError::from)
                .and_then(Event::try_from)
            {
                Ok(ev) => ev,
                Err(e) => {
                    warn!(error = %e, "skipping malformed feed entry");
                    continue;
                }
            };
            match self.ingress.submit(event).await {
                Ok(()) => accepted += 1,
                Err(OpfeedError::IngressClosed) => return Err(OpfeedError::IngressClosed),
                Err(e) => warn!(error = %e, "skipping invalid feed entry"),
            }
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use opfeed_core::event::{EventKind, EventStatus};
    use opfeed_fanout::ingress;
    use serde_json::json;
    use std::collections::HashMap;

    fn poller(pd_addr: &str, ingress: Ingress) -> FeedPoller {
        let cfg = FeedConfig {
            enabled: true,
            pd_addr: pd_addr.to_string(),
            poll_interval_ms: 10,
        };
        FeedPoller::new(&cfg, ingress).unwrap()
    }

    /// A feed record the way PD serializes it: every `*_event` object is
    /// present, zero-valued except the one `code` selects.
    fn record(id: u64, code: u8, status: u8, key: &str, payload: Value) -> Value {
        let mut raw = json!({
            "id": id,
            "code": code,
            "status": status,
            "split_event": {"region": 0, "left": 0, "right": 0},
            "transfer_leader_event": {"region": 0, "store_from": 0, "store_to": 0},
            "add_replica_event": {"region": 0},
            "remove_replica_event": {"region": 0},
        });
        raw[key] = payload;
        raw
    }

    #[tokio::test]
    async fn relay_advances_offset_and_skips_bad_entries() {
        let (ingress, mut rx) = ingress::channel(8);
        let mut p = poller("localhost:1", ingress);

        let batch = vec![
            record(3, 1, 1, "split_event", json!({"region": 1, "left": 2, "right": 3})),
            // unknown code
            record(7, 9, 1, "split_event", json!({"region": 1})),
            // zero region fails validation
            record(5, 3, 1, "add_replica_event", json!({"region": 0})),
            record(
                6,
                2,
                2,
                "transfer_leader_event",
                json!({"region": 2, "store_from": 1, "store_to": 4}),
            ),
        ];
        assert_eq!(p.relay(batch).await.unwrap(), 2);
        assert_eq!(p.offset(), 7);

        let split = rx.recv().await.unwrap();
        assert_eq!(split.kind(), EventKind::Split);
        assert_eq!(split.id, 3);
        assert_eq!(split.status, Some(EventStatus::Start));
        let transfer = rx.recv().await.unwrap();
        assert_eq!(transfer.kind(), EventKind::TransferLeader);
        assert_eq!(transfer.status, Some(EventStatus::End));
    }

    #[tokio::test]
    async fn relay_rejects_client_shaped_events() {
        let (ingress, _rx) = ingress::channel(8);
        let mut p = poller("localhost:1", ingress);
        let batch = vec![json!({"id": 2, "kind": "split", "payload": {"region": 1}})];
        assert_eq!(p.relay(batch).await.unwrap(), 0);
        assert_eq!(p.offset(), 2);
    }

    #[tokio::test]
    async fn relay_reports_closed_ingress() {
        let (ingress, rx) = ingress::channel(1);
        drop(rx);
        let mut p = poller("localhost:1", ingress);
        let batch = vec![record(1, 4, 1, "remove_replica_event", json!({"region": 1}))];
        assert!(matches!(p.relay(batch).await, Err(OpfeedError::IngressClosed)));
    }

    #[tokio::test]
    async fn poll_once_queries_with_current_offset() {
        async fn feed(Query(q): Query<HashMap<String, u64>>) -> Json<Value> {
            let offset = q.get("offset").copied().unwrap_or(0);
            if offset == 0 {
                Json(json!([record(4, 3, 1, "add_replica_event", json!({"region": 9}))]))
            } else {
                Json(json!([]))
            }
        }
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/api/v1/feed", get(feed));
        tokio::spawn(async move { axum::serve(listener, app).await });

        let (ingress, mut rx) = ingress::channel(8);
        let mut p = poller(&addr.to_string(), ingress);

        assert_eq!(p.poll_once().await.unwrap(), 1);
        assert_eq!(p.offset(), 4);
        assert_eq!(rx.recv().await.unwrap().body.region(), 9);

        assert_eq!(p.poll_once().await.unwrap(), 0);
        assert_eq!(p.offset(), 4);
    }

    #[tokio::test]
    async fn unreachable_pd_is_a_feed_error() {
        let (ingress, _rx) = ingress::channel(1);
        // nothing listens on the discard port
        let mut p = poller("127.0.0.1:9", ingress);
        assert!(matches!(p.poll_once().await, Err(OpfeedError::Feed(_))));
    }
}
