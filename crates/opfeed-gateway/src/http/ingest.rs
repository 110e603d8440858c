//! Event ingestion endpoint: POST /post (legacy path) and POST /v1/events.
//!
//! Body: one event as JSON, e.g.
//! `{ "kind": "split", "payload": { "region": 1, "left": 2, "right": 3 } }`.
//! The reply only says whether the event was accepted into the broadcast
//! stream; it never reports delivery to viewers.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use opfeed_core::config::MAX_EVENT_BYTES;
use opfeed_core::error::OpfeedError;
use opfeed_protocol::frames::AckFrame;
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;

/// Validate the body and hand it to the broadcaster.
///
/// Returns 200 on acceptance, 400/413 on bad input, 503 once the
/// broadcaster has stopped.
pub async fn post_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AckFrame>, (StatusCode, Json<AckFrame>)> {
    if body.len() > MAX_EVENT_BYTES {
        return Err(reject(OpfeedError::PayloadTooLarge {
            size: body.len(),
            max: MAX_EVENT_BYTES,
        }));
    }

    state
        .ingress
        .submit_json(&body)
        .await
        .map(|()| Json(AckFrame::ok()))
        .map_err(reject)
}

fn reject(e: OpfeedError) -> (StatusCode, Json<AckFrame>) {
    let status = status_for(&e);
    warn!(code = e.code(), error = %e, "event rejected");
    (status, Json(AckFrame::from(&e)))
}

fn status_for(e: &OpfeedError) -> StatusCode {
    match e {
        OpfeedError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        OpfeedError::IngressClosed => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
