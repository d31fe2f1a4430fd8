//! Broadcast channel for committed domain events
//!
//! Observers (read models, webhooks, tests) see events only after the
//! write that produced them has committed. Slow observers lose the oldest
//! events rather than holding back publishers.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::DomainEvent;

/// Undelivered events a subscriber may fall behind by before it lags
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub type SharedEventBus = Arc<EventBus>;

pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A zero capacity is bumped to one; tokio rejects empty channels.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Fan `event` out to current subscribers. Never fails: an event with
    /// nobody listening is simply dropped.
    pub fn publish(&self, event: DomainEvent) {
        let kind = event.event_type();
        let delivered_to = self.sender.send(event).unwrap_or(0);
        debug!(event_type = kind, delivered_to, "domain event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver {
            receiver: self.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrows a subscription to one transaction, one user, or a set of
/// event kinds. Criteria combine with AND; an empty filter matches all.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    transaction_id: Option<String>,
    user_id: Option<String>,
    kinds: Option<Vec<&'static str>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Events that notify `user_id`
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restrict to the given [`DomainEvent::event_type`] names
    pub fn kinds(mut self, kinds: &[&'static str]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }

    pub fn matches(&self, event: &DomainEvent) -> bool {
        let transaction_ok = self
            .transaction_id
            .as_deref()
            .map_or(true, |id| event.transaction_id() == Some(id));
        let user_ok = self
            .user_id
            .as_ref()
            .map_or(true, |id| event.recipients().contains(&id));
        let kind_ok = self
            .kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&event.event_type()));

        transaction_ok && user_ok && kind_ok
    }
}

/// Receiver that skips non-matching events and rides over lag
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Next matching event, or `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "filtered subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
