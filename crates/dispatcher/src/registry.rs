//! Subscriber registry
//!
//! Copy-on-read: dispatch works on a cloned snapshot of the subscriber list,
//! so handlers may subscribe or unsubscribe while being invoked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use contracts::EventCategory;
use tracing::debug;

use crate::handler::EventHandler;

/// Unique subscriber id within one bus
pub type SubscriberId = u64;

/// A registered handler
pub(crate) struct Subscriber {
    id: SubscriberId,
    handler: Arc<dyn EventHandler>,
    /// Cleared on unsubscribe, so stale snapshots skip this subscriber
    active: AtomicBool,
}

impl Subscriber {
    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        self.handler.name()
    }

    pub(crate) fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<EventCategory, Vec<Arc<Subscriber>>>>,
}

impl SubscriberRegistry {
    pub(crate) fn insert(&self, category: EventCategory, handler: Arc<dyn EventHandler>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            handler,
            active: AtomicBool::new(true),
        });

        let mut map = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(category).or_default().push(subscriber);
        id
    }

    /// Remove one subscriber; returns false if it was already gone
    pub(crate) fn remove(&self, category: EventCategory, id: SubscriberId) -> bool {
        let mut map = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = map.get_mut(&category) else {
            return false;
        };
        let Some(pos) = list.iter().position(|s| s.id == id) else {
            return false;
        };

        let removed = list.remove(pos);
        removed.active.store(false, Ordering::Release);
        if list.is_empty() {
            map.remove(&category);
        }
        true
    }

    /// Snapshot of the current subscribers of a category
    pub(crate) fn snapshot(&self, category: EventCategory) -> Vec<Arc<Subscriber>> {
        let map = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&category).cloned().unwrap_or_default()
    }

    pub(crate) fn count(&self, category: EventCategory) -> usize {
        let map = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&category).map_or(0, Vec::len)
    }
}

/// Capability returned by `EventBus::subscribe`
///
/// Dropping the token keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to deregister the handler.
#[must_use = "dropping a Subscription leaves the handler registered for the bus lifetime"]
pub struct Subscription {
    id: SubscriberId,
    category: EventCategory,
    handler_name: String,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        category: EventCategory,
        handler_name: String,
        registry: Weak<SubscriberRegistry>,
    ) -> Self {
        Self {
            id,
            category,
            handler_name,
            registry,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// Deregister exactly this handler
    ///
    /// The handler receives no event dispatched after this returns, even if
    /// a fan-out that started earlier still holds it in its snapshot.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.remove(self.category, self.id);
        debug!(
            handler = %self.handler_name,
            category = %self.category,
            removed,
            "Unsubscribed"
        );
        removed
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("handler", &self.handler_name)
            .finish()
    }
}
