//! Favicon update events and subscriber fan-out
//!
//! Delivery is best effort: every subscriber has a small buffer, and an
//! event that does not fit is dropped for that subscriber only.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, trace};
use uuid::Uuid;

/// A site's favicon changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaviconEvent {
    pub site_id: Uuid,
    /// Cache-busting URL, see [`favicon_url`]
    pub favicon_url: String,
    pub updated_at: DateTime<Utc>,
}

/// `/favicons/{site_id}?ts={unix_seconds}`; the query is omitted when the
/// icon has never been fetched.
pub fn favicon_url(site_id: Uuid, fetched_at: Option<DateTime<Utc>>) -> String {
    match fetched_at.map(|t| t.timestamp()) {
        Some(ts) if ts != 0 => format!("/favicons/{site_id}?ts={ts}"),
        _ => format!("/favicons/{site_id}"),
    }
}

#[derive(Default)]
struct Subscribers {
    senders: HashMap<u64, mpsc::Sender<FaviconEvent>>,
    /// Set by `close_all`; no sender may be registered afterwards
    closed: bool,
}

pub(crate) struct SubscriberRegistry {
    buffer: usize,
    next_id: AtomicU64,
    inner: RwLock<Subscribers>,
}

impl SubscriberRegistry {
    pub(crate) fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            inner: RwLock::new(Subscribers::default()),
        }
    }

    /// Register a subscriber, or hand out a closed one once `close_all` ran
    pub(crate) fn subscribe(self: &Arc<Self>) -> FaviconSubscription {
        let mut inner = self.inner.write();
        if inner.closed {
            return self.closed_subscription();
        }

        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        inner.senders.insert(id, sender);
        drop(inner);
        trace!("Favicon subscriber {} registered", id);

        FaviconSubscription {
            id,
            receiver,
            registry: Arc::downgrade(self),
        }
    }

    /// A subscription whose channel is already closed
    pub(crate) fn closed_subscription(&self) -> FaviconSubscription {
        let (_, receiver) = mpsc::channel(1);
        FaviconSubscription {
            id: 0,
            receiver,
            registry: Weak::new(),
        }
    }

    /// Deliver to every subscriber without waiting; returns how many received it
    pub(crate) fn broadcast(&self, event: &FaviconEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let inner = self.inner.read();
            for (id, sender) in inner.senders.iter() {
                match sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        debug!("Favicon subscriber {} is full, dropping event", id);
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut inner = self.inner.write();
            for id in closed {
                inner.senders.remove(&id);
            }
        }
        delivered
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        if self.inner.write().senders.remove(&id).is_some() {
            trace!("Favicon subscriber {} removed", id);
        }
    }

    /// Drop every sender, closing each channel exactly once, and refuse
    /// later registrations
    pub(crate) fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut inner = self.inner.write();
            inner.closed = true;
            inner.senders.drain().collect()
        };
        drained.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().senders.len()
    }
}

/// Live handle on the favicon event stream.
///
/// Dropping the handle unsubscribes it.
pub struct FaviconSubscription {
    id: u64,
    receiver: mpsc::Receiver<FaviconEvent>,
    registry: Weak<SubscriberRegistry>,
}

impl FaviconSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event; `None` once the subscription is closed and drained
    pub async fn recv(&mut self) -> Option<FaviconEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<FaviconEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Stop receiving; buffered events stay readable
    pub fn close(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
        self.registry = Weak::new();
        self.receiver.close();
    }
}

impl Drop for FaviconSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(site_id: Uuid) -> FaviconEvent {
        let now = Utc::now();
        FaviconEvent {
            site_id,
            favicon_url: favicon_url(site_id, Some(now)),
            updated_at: now,
        }
    }

    #[test]
    fn test_favicon_url_convention() {
        let id = Uuid::new_v4();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(favicon_url(id, Some(at)), format!("/favicons/{id}?ts=1700000000"));
        assert_eq!(favicon_url(id, None), format!("/favicons/{id}"));
        assert_eq!(
            favicon_url(id, DateTime::from_timestamp(0, 0)),
            format!("/favicons/{id}")
        );
    }

    #[test]
    fn test_event_serializes_for_stream_consumers() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(event(id)).unwrap();
        assert_eq!(json["site_id"], id.to_string());
        assert!(json["favicon_url"].as_str().unwrap().starts_with("/favicons/"));
        assert!(json["updated_at"].is_string());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let registry = Arc::new(SubscriberRegistry::new(8));
        let mut first = registry.subscribe();
        let mut second = registry.subscribe();
        assert_eq!(registry.len(), 2);

        let sent = event(Uuid::new_v4());
        assert_eq!(registry.broadcast(&sent), 2);
        assert_eq!(first.recv().await, Some(sent.clone()));
        assert_eq!(second.recv().await, Some(sent));
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_instead_of_blocking() {
        let registry = Arc::new(SubscriberRegistry::new(2));
        let mut slow = registry.subscribe();
        let mut fast = registry.subscribe();

        for _ in 0..2 {
            registry.broadcast(&event(Uuid::new_v4()));
        }
        // Drain only the fast subscriber; the slow one is now full
        fast.try_recv().unwrap();
        fast.try_recv().unwrap();

        let third = event(Uuid::new_v4());
        assert_eq!(registry.broadcast(&third), 1);
        assert_eq!(fast.try_recv().unwrap(), third);

        slow.try_recv().unwrap();
        slow.try_recv().unwrap();
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_close_and_drop_unsubscribe() {
        let registry = Arc::new(SubscriberRegistry::new(8));
        let mut closed = registry.subscribe();
        let dropped = registry.subscribe();
        assert_eq!(registry.len(), 2);

        closed.close();
        closed.close();
        drop(dropped);
        assert_eq!(registry.len(), 0);
        assert_eq!(closed.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_all_closes_each_channel() {
        let registry = Arc::new(SubscriberRegistry::new(8));
        let mut a = registry.subscribe();
        let mut b = registry.subscribe();

        assert_eq!(registry.close_all(), 2);
        assert_eq!(registry.close_all(), 0);
        assert_eq!(a.recv().await, None);
        assert!(matches!(b.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[tokio::test]
    async fn test_subscribe_after_close_all_is_closed() {
        let registry = Arc::new(SubscriberRegistry::new(8));
        registry.close_all();

        let mut late = registry.subscribe();
        assert_eq!(registry.len(), 0);
        assert!(matches!(late.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(registry.broadcast(&event(Uuid::new_v4())), 0);
        assert_eq!(late.recv().await, None);
    }
}
