use opfeed_core::error::{OpfeedError, Result};
use opfeed_core::event::Event;
use opfeed_core::types::ConnId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};

/// Outcome of a single non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Queue full; the event is lost for this subscriber only.
    Dropped,
    /// The owning session is already tearing down.
    Closed,
}

/// Sending half of one viewer's queue, as handed out by [`Registry::snapshot`].
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: ConnId,
    tx: mpsc::Sender<Arc<Event>>,
}

impl Subscriber {
    pub fn id(&self) -> &ConnId {
        &self.id
    }

    /// Enqueue without waiting. Never blocks on a slow viewer.
    pub fn try_deliver(&self, event: &Arc<Event>) -> Delivery {
        match self.tx.try_send(Arc::clone(event)) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Live set of connected viewers: conn_id -> queue sender.
///
/// One `RwLock` guards the whole map. Snapshots take the read side so they
/// can run concurrently; register/unregister take the write side. No lock is
/// held across an await point or while events are being enqueued.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<ConnId, mpsc::Sender<Arc<Event>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bounded queue for `id` and return its receiving end.
    ///
    /// Connection ids are unique per session, so a duplicate is a bug in the
    /// caller. It never replaces the live entry: debug builds panic, release
    /// builds log it and return an error.
    pub fn register(&self, id: ConnId, capacity: usize) -> Result<mpsc::Receiver<Arc<Event>>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&id) {
            drop(entries);
            error!(conn_id = %id, "duplicate subscriber registration");
            if cfg!(debug_assertions) {
                panic!("duplicate subscriber registration: {id}");
            }
            return Err(OpfeedError::DuplicateSubscriber {
                conn_id: id.to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        entries.insert(id.clone(), tx);
        debug!(conn_id = %id, subscribers = entries.len(), "subscriber registered");
        Ok(rx)
    }

    /// [`register`](Self::register) plus a guard that unregisters on drop.
    pub fn subscribe(self: &Arc<Self>, id: ConnId, capacity: usize) -> Result<Subscription> {
        let rx = self.register(id.clone(), capacity)?;
        Ok(Subscription {
            registry: Arc::clone(self),
            id,
            rx,
        })
    }

    /// Remove `id` if present. Returns whether an entry was removed; calling
    /// it again, or for an unknown id, is a no-op.
    pub fn unregister(&self, id: &ConnId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.remove(id).is_some();
        if removed {
            debug!(conn_id = %id, subscribers = entries.len(), "subscriber unregistered");
        }
        removed
    }

    /// Every registered queue at one instant. The lock is released on return,
    /// so callers iterate (and enqueue) without holding it.
    pub fn snapshot(&self) -> Vec<Subscriber> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|(id, tx)| Subscriber {
                id: id.clone(),
                tx: tx.clone(),
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &ConnId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live registration. Owns the receiving end of the queue and removes the
/// registry entry exactly once when dropped, including during unwinding.
#[derive(Debug)]
pub struct Subscription {
    registry: Arc<Registry>,
    id: ConnId,
    rx: mpsc::Receiver<Arc<Event>>,
}

impl Subscription {
    pub fn id(&self) -> &ConnId {
        &self.id
    }

    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}
