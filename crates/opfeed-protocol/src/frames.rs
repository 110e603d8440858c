use opfeed_core::error::OpfeedError;
use opfeed_core::event::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server → viewer push of one broadcast event.
/// Wire: `{ "type": "event", "event": "split", "seq": 42, "payload": {...} }`
///
/// `seq` numbers the frames sent on one connection, starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "event".to_string(),
            event: event.into(),
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            seq: None,
        }
    }

    /// Frame carrying a relayed operator event; the payload is the full event record.
    pub fn from_event(event: &Event) -> Self {
        Self::new(event.kind().as_str(), event)
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Server → producer reply to an event submission.
/// Wire: `{ "ok": true }` or `{ "ok": false, "error": { "code": "...", "message": "..." } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckFrame {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl AckFrame {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn err(code: &str, message: &str) -> Self {
        Self {
            ok: false,
            error: Some(ErrorShape {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

impl From<&OpfeedError> for AckFrame {
    fn from(e: &OpfeedError) -> Self {
        AckFrame::err(e.code(), &e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}
