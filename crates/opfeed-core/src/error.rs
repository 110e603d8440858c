use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpfeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("parameter 'event' is required")]
    EmptyEvent,

    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Ingress closed: broadcaster is not running")]
    IngressClosed,

    #[error("Subscriber already registered: {conn_id}")]
    DuplicateSubscriber { conn_id: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream feed error: {0}")]
    Feed(String),
}

impl OpfeedError {
    /// Short error code string sent to producers in error frames.
    pub fn code(&self) -> &'static str {
        match self {
            OpfeedError::Config(_) => "CONFIG_ERROR",
            OpfeedError::EmptyEvent => "EMPTY_EVENT",
            OpfeedError::MalformedEvent(_) => "MALFORMED_EVENT",
            OpfeedError::InvalidEvent(_) => "INVALID_EVENT",
            OpfeedError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            OpfeedError::IngressClosed => "INGRESS_CLOSED",
            OpfeedError::DuplicateSubscriber { .. } => "DUPLICATE_SUBSCRIBER",
            OpfeedError::Transport(_) => "TRANSPORT_ERROR",
            OpfeedError::Feed(_) => "FEED_ERROR",
        }
    }

    /// True for errors caused by the producer's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OpfeedError::EmptyEvent
                | OpfeedError::MalformedEvent(_)
                | OpfeedError::InvalidEvent(_)
                | OpfeedError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OpfeedError>;
