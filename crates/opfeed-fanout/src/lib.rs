//! Fan-out core: the live subscriber registry, the broadcaster that drains
//! the ingress into every registered queue, and the per-connection session
//! loop that delivers those queues to the wire.

pub mod broadcaster;
pub mod ingress;
pub mod registry;
pub mod session;

pub use broadcaster::{Broadcaster, FanoutReport};
pub use ingress::{Ingress, IngressReceiver};
pub use registry::{Registry, Subscriber, Subscription};
pub use session::{CloseReason, Session, SessionConfig, Transport, WireFrame};
