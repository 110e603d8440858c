// Verify the wire format the bundled viewer page and producers rely on.

use opfeed_core::error::OpfeedError;
use opfeed_core::event::{Event, EventBody, EventStatus, SplitPayload, TransferLeaderPayload};
use opfeed_protocol::frames::{AckFrame, EventFrame};

#[test]
fn event_frame_carries_kind_and_seq() {
    let ev = Event::new(EventBody::Split(SplitPayload { region: 1, left: 2, right: 3 }));
    let json = EventFrame::from_event(&ev).with_seq(42).to_json();

    assert!(json.contains(r#""type":"event""#));
    assert!(json.contains(r#""event":"split""#));
    assert!(json.contains(r#""seq":42"#));
    assert!(json.contains(r#""region":1"#));
}

#[test]
fn event_frame_payload_parses_back_to_event() {
    let ev = Event::new(EventBody::TransferLeader(TransferLeaderPayload {
        region: 7,
        store_from: 1,
        store_to: 3,
    }))
    .with_id(11)
    .with_status(EventStatus::Start);

    let frame: EventFrame = serde_json::from_str(&EventFrame::from_event(&ev).to_json()).unwrap();
    assert_eq!(frame.event, "transfer_leader");
    let back: Event = serde_json::from_value(frame.payload.unwrap()).unwrap();
    assert_eq!(back, ev);
}

#[test]
fn event_frame_without_seq_omits_field() {
    let ev = Event::new(EventBody::Split(SplitPayload { region: 5, left: 0, right: 0 }));
    let json = EventFrame::from_event(&ev).to_json();
    assert!(!json.contains(r#""seq""#));
}

#[test]
fn ack_ok_serialization() {
    let json = serde_json::to_string(&AckFrame::ok()).unwrap();
    assert_eq!(json, r#"{"ok":true}"#);
}

#[test]
fn ack_from_validation_error() {
    let ack = AckFrame::from(&OpfeedError::InvalidEvent("region must be non-zero".into()));
    let json = serde_json::to_string(&ack).unwrap();

    assert!(json.contains(r#""ok":false"#));
    assert!(json.contains(r#""code":"INVALID_EVENT""#));
    assert!(json.contains("region must be non-zero"));
}

#[test]
fn ack_for_empty_body_matches_legacy_message() {
    let ack = AckFrame::from(&OpfeedError::EmptyEvent);
    let err = ack.error.unwrap();
    assert_eq!(err.code, "EMPTY_EVENT");
    assert_eq!(err.message, "parameter 'event' is required");
}
