//! Observer registry for status and restore notifications
//!
//! Callbacks run synchronously on the notifying task, in registration
//! order. The observer list is snapshotted before dispatch, so a callback
//! may subscribe or unsubscribe without deadlocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use shared::SyncStatus;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct ObserverRegistry<T: ?Sized> {
    next_id: AtomicU64,
    observers: RwLock<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T: ?Sized> ObserverRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(callback)));
        id
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .observers
            .read()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Current [`SyncStatus`] plus its subscribers
///
/// Subscribers hear about a status only when it differs from the last
/// published one.
#[derive(Default)]
pub struct StatusHub {
    current: Mutex<SyncStatus>,
    observers: ObserverRegistry<SyncStatus>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.current.lock().clone()
    }

    /// Apply `update` and notify if anything changed
    pub fn update(&self, update: impl FnOnce(&mut SyncStatus)) -> bool {
        let changed = {
            let mut current = self.current.lock();
            let before = current.clone();
            update(&mut current);
            (*current != before).then(|| current.clone())
        };
        match changed {
            Some(status) => {
                self.observers.notify(&status);
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&SyncStatus) + Send + Sync + 'static) -> SubscriptionId {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifies_in_registration_order() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = seen.clone();
        registry.subscribe(move |v| s1.lock().push(("first", *v)));
        let s2 = seen.clone();
        let second = registry.subscribe(move |v| s2.lock().push(("second", *v)));

        registry.notify(&1);
        assert!(registry.unsubscribe(second));
        assert!(!registry.unsubscribe(second));
        registry.notify(&2);

        assert_eq!(
            *seen.lock(),
            vec![("first", 1), ("second", 1), ("first", 2)]
        );
    }

    #[test]
    fn unchanged_status_is_not_published() {
        let hub = StatusHub::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        hub.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(hub.update(|s| s.online = true));
        assert!(!hub.update(|s| s.online = true));
        assert!(hub.update(|s| s.pending_orders = 3));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(hub.snapshot().pending_orders, 3);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let registry: Arc<ObserverRegistry<u32>> = Arc::new(ObserverRegistry::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let r = registry.clone();
        let s = slot.clone();
        let id = registry.subscribe(move |_| {
            if let Some(id) = *s.lock() {
                r.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        registry.notify(&0);
        assert!(registry.is_empty());
    }
}
