//! Operator events relayed from producers to viewers.
//!
//! Wire shape: `{ "id": 7, "status": "start", "kind": "split", "payload": { "region": 1, ... } }`.
//! `id` and `status` are optional on input; the payload shape is fixed by `kind`.
//!
//! The PD operator feed uses a different record layout, decoded through
//! [`FeedEntry`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{OpfeedError, Result};

/// Discriminator of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Split,
    TransferLeader,
    AddReplica,
    RemoveReplica,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Split => "split",
            EventKind::TransferLeader => "transfer_leader",
            EventKind::AddReplica => "add_replica",
            EventKind::RemoveReplica => "remove_replica",
        }
    }

    /// Numeric `code` used by PD feed records.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(EventKind::Split),
            2 => Some(EventKind::TransferLeader),
            3 => Some(EventKind::AddReplica),
            4 => Some(EventKind::RemoveReplica),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the operator the event describes is starting or has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Start,
    End,
}

impl EventStatus {
    /// Numeric `status` used by PD feed records; 0 means unset.
    pub fn from_code(code: u8) -> Result<Option<Self>> {
        match code {
            0 => Ok(None),
            1 => Ok(Some(EventStatus::Start)),
            2 => Ok(Some(EventStatus::End)),
            other => Err(OpfeedError::InvalidEvent(format!("unknown status {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPayload {
    pub region: u64,
    #[serde(default)]
    pub left: u64,
    #[serde(default)]
    pub right: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeaderPayload {
    pub region: u64,
    pub store_from: u64,
    pub store_to: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaPayload {
    pub region: u64,
}

/// Kind-specific body of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBody {
    Split(SplitPayload),
    TransferLeader(TransferLeaderPayload),
    AddReplica(ReplicaPayload),
    RemoveReplica(ReplicaPayload),
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::Split(_) => EventKind::Split,
            EventBody::TransferLeader(_) => EventKind::TransferLeader,
            EventBody::AddReplica(_) => EventKind::AddReplica,
            EventBody::RemoveReplica(_) => EventKind::RemoveReplica,
        }
    }

    pub fn region(&self) -> u64 {
        match self {
            EventBody::Split(p) => p.region,
            EventBody::TransferLeader(p) => p.region,
            EventBody::AddReplica(p) | EventBody::RemoveReplica(p) => p.region,
        }
    }

    fn to_payload(&self) -> Value {
        let value = match self {
            EventBody::Split(p) => serde_json::to_value(p),
            EventBody::TransferLeader(p) => serde_json::to_value(p),
            EventBody::AddReplica(p) | EventBody::RemoveReplica(p) => serde_json::to_value(p),
        };
        value.unwrap_or(Value::Null)
    }

    fn from_payload(kind: EventKind, payload: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            EventKind::Split => EventBody::Split(serde_json::from_value(payload)?),
            EventKind::TransferLeader => EventBody::TransferLeader(serde_json::from_value(payload)?),
            EventKind::AddReplica => EventBody::AddReplica(serde_json::from_value(payload)?),
            EventKind::RemoveReplica => EventBody::RemoveReplica(serde_json::from_value(payload)?),
        })
    }
}

/// One broadcastable occurrence. Immutable once built; fanned out as `Arc<Event>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent", into = "RawEvent")]
pub struct Event {
    /// Upstream feed offset; 0 for events posted directly.
    pub id: u64,
    pub status: Option<EventStatus>,
    pub body: EventBody,
}

impl Event {
    pub fn new(body: EventBody) -> Self {
        Self {
            id: 0,
            status: None,
            body,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    /// Parse and validate a producer-submitted JSON body.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(OpfeedError::EmptyEvent);
        }
        let event: Event = serde_json::from_slice(raw)?;
        event.validate()?;
        Ok(event)
    }

    /// Semantic checks that the type system does not already enforce.
    pub fn validate(&self) -> Result<()> {
        if self.body.region() == 0 {
            return Err(OpfeedError::InvalidEvent(format!(
                "{}: region must be non-zero",
                self.kind()
            )));
        }
        if let EventBody::TransferLeader(p) = &self.body {
            if p.store_from == p.store_to {
                return Err(OpfeedError::InvalidEvent(format!(
                    "transfer_leader: store_from and store_to are both {}",
                    p.store_from
                )));
            }
        }
        Ok(())
    }
}

/// Serde mirror of the wire shape; the payload is typed once `kind` is known.
#[derive(Serialize, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<EventStatus>,
    kind: EventKind,
    payload: Value,
}

impl TryFrom<RawEvent> for Event {
    type Error = serde_json::Error;

    fn try_from(raw: RawEvent) -> serde_json::Result<Self> {
        Ok(Event {
            id: raw.id,
            status: raw.status,
            body: EventBody::from_payload(raw.kind, raw.payload)?,
        })
    }
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        RawEvent {
            id: event.id,
            status: event.status,
            kind: event.body.kind(),
            payload: event.body.to_payload(),
        }
    }
}

/// One record of the PD operator feed.
///
/// PD numbers kinds and statuses, and nests the payload under a per-kind
/// key. It serializes every `*_event` object, zero-valued for the kinds the
/// record is not about, so only the one selected by `code` is decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    pub id: u64,
    pub code: u8,
    #[serde(default)]
    pub status: u8,
    #[serde(default)]
    pub split_event: Option<Value>,
    #[serde(default)]
    pub transfer_leader_event: Option<Value>,
    #[serde(default)]
    pub add_replica_event: Option<Value>,
    #[serde(default)]
    pub remove_replica_event: Option<Value>,
}

impl TryFrom<FeedEntry> for Event {
    type Error = OpfeedError;

    fn try_from(entry: FeedEntry) -> Result<Self> {
        let kind = EventKind::from_code(entry.code)
            .ok_or_else(|| OpfeedError::InvalidEvent(format!("unknown code {}", entry.code)))?;
        let payload = match kind {
            EventKind::Split => entry.split_event,
            EventKind::TransferLeader => entry.transfer_leader_event,
            EventKind::AddReplica => entry.add_replica_event,
            EventKind::RemoveReplica => entry.remove_replica_event,
        }
        .ok_or_else(|| OpfeedError::InvalidEvent(format!("{kind}: missing {kind}_event")))?;

        Ok(Event {
            id: entry.id,
            status: EventStatus::from_code(entry.status)?,
            body: EventBody::from_payload(kind, payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_split_with_defaults() {
        let ev = Event::parse(br#"{"kind":"split","payload":{"region":1}}"#).unwrap();
        assert_eq!(ev.kind(), EventKind::Split);
        assert_eq!(ev.id, 0);
        assert_eq!(
            ev.body,
            EventBody::Split(SplitPayload { region: 1, left: 0, right: 0 })
        );
    }

    #[test]
    fn parse_transfer_leader_with_status() {
        let raw = br#"{"id":9,"status":"end","kind":"transfer_leader","payload":{"region":4,"store_from":1,"store_to":2}}"#;
        let ev = Event::parse(raw).unwrap();
        assert_eq!(ev.id, 9);
        assert_eq!(ev.status, Some(EventStatus::End));
        assert_eq!(ev.body.region(), 4);
    }

    #[test]
    fn empty_body_is_rejected() {
        assert!(matches!(Event::parse(b""), Err(OpfeedError::EmptyEvent)));
        assert!(matches!(Event::parse(b"  \n"), Err(OpfeedError::EmptyEvent)));
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let err = Event::parse(br#"{"kind":"merge","payload":{"region":1}}"#).unwrap_err();
        assert_eq!(err.code(), "MALFORMED_EVENT");
    }

    #[test]
    fn payload_not_matching_kind_is_malformed() {
        let err = Event::parse(br#"{"kind":"transfer_leader","payload":{"region":1}}"#).unwrap_err();
        assert!(matches!(err, OpfeedError::MalformedEvent(_)));
    }

    #[test]
    fn zero_region_is_invalid() {
        let err = Event::parse(br#"{"kind":"add_replica","payload":{"region":0}}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_EVENT");
        assert!(err.is_client_error());
    }

    #[test]
    fn transfer_to_same_store_is_invalid() {
        let raw = br#"{"kind":"transfer_leader","payload":{"region":3,"store_from":5,"store_to":5}}"#;
        assert!(matches!(Event::parse(raw), Err(OpfeedError::InvalidEvent(_))));
    }

    #[test]
    fn serializes_kind_and_payload() {
        let ev = Event::new(EventBody::RemoveReplica(ReplicaPayload { region: 12 }))
            .with_status(EventStatus::Start);
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains(r#""kind":"remove_replica""#));
        assert!(json.contains(r#""status":"start""#));
        assert!(json.contains(r#""payload":{"region":12}"#));
    }

    fn feed_entry(raw: serde_json::Value) -> Result<Event> {
        let entry: FeedEntry = serde_json::from_value(raw)?;
        Event::try_from(entry)
    }

    #[test]
    fn feed_record_selects_payload_by_code() {
        // PD sends every *_event object, zero-valued except the selected one
        let ev = feed_entry(serde_json::json!({
            "id": 11,
            "code": 2,
            "status": 2,
            "split_event": {"region": 0, "left": 0, "right": 0},
            "add_replica_event": {"region": 0},
            "remove_replica_event": {"region": 0},
            "transfer_leader_event": {"region": 5, "store_from": 1, "store_to": 3}
        }))
        .unwrap();
        assert_eq!(ev.id, 11);
        assert_eq!(ev.status, Some(EventStatus::End));
        assert_eq!(
            ev.body,
            EventBody::TransferLeader(TransferLeaderPayload { region: 5, store_from: 1, store_to: 3 })
        );
        ev.validate().unwrap();
    }

    #[test]
    fn feed_record_maps_every_code() {
        let cases = [
            (1, "split_event", EventKind::Split),
            (3, "add_replica_event", EventKind::AddReplica),
            (4, "remove_replica_event", EventKind::RemoveReplica),
        ];
        for (code, key, kind) in cases {
            let mut raw = serde_json::json!({"id": 1, "code": code, "status": 1});
            raw[key] = serde_json::json!({"region": 7});
            let ev = feed_entry(raw).unwrap();
            assert_eq!(ev.kind(), kind);
            assert_eq!(ev.status, Some(EventStatus::Start));
            assert_eq!(ev.body.region(), 7);
        }
    }

    #[test]
    fn feed_record_with_unknown_code_or_status_is_invalid() {
        let bad_code = feed_entry(serde_json::json!({"id": 1, "code": 9}));
        assert!(matches!(bad_code, Err(OpfeedError::InvalidEvent(_))));

        let bad_status = feed_entry(serde_json::json!({
            "id": 1, "code": 3, "status": 7, "add_replica_event": {"region": 1}
        }));
        assert!(matches!(bad_status, Err(OpfeedError::InvalidEvent(_))));
    }

    #[test]
    fn feed_record_without_selected_object_is_invalid() {
        let err = feed_entry(serde_json::json!({
            "id": 1, "code": 1, "status": 1, "add_replica_event": {"region": 1}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("split_event"));
    }
}
