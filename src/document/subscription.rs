use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use parking_lot::{Mutex, ReentrantMutex};

/// Receives a document's new value, or `None` once it is removed
pub type Callback<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;

type Cancel = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Pending { missed: bool },  // Initial value not delivered yet
    Active,
}

struct Entry<T> {
    token: u64,
    callback: Callback<T>,
    gate: ReentrantMutex<Cell<Gate>>,  // Held while delivering to this entry
}

/// In-process map from document key to its subscribers.
///
/// Subscribers of one key are notified in registration order. Deliveries to
/// one subscriber never overlap.
pub struct SubscriberRegistry<T> {
    subscribers: Mutex<HashMap<String, Vec<Arc<Entry<T>>>>>,
    next_token: AtomicU64,
}

impl<T: 'static> SubscriberRegistry<T> {
    pub fn new() -> Self {
        SubscriberRegistry {
            subscribers: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Register a callback that receives every later notification of `key`
    pub fn register(self: &Arc<Self>, key: &str, callback: Callback<T>) -> Subscription {
        self.insert(key, callback, Gate::Active)
    }

    /// Register a callback that stays silent until [`SubscriberRegistry::activate`]
    /// hands it its initial value
    pub fn register_pending(self: &Arc<Self>, key: &str, callback: Callback<T>) -> Subscription {
        self.insert(key, callback, Gate::Pending { missed: false })
    }

    /// Deliver `initial` to a pending subscription and make it active.
    ///
    /// Returns `false`, delivering nothing, if a notification for the key
    /// arrived since registration (or since the last failed attempt): the
    /// caller read a value that may already be stale and should read again.
    pub fn activate(&self, subscription: &Subscription, initial: Option<&T>) -> bool {
        let entry = match self.entry(&subscription.key, subscription.token) {
            Some(entry) => entry,
            None => return true,
        };

        let gate = entry.gate.lock();
        match gate.get() {
            Gate::Pending { missed: true } => {
                gate.set(Gate::Pending { missed: false });
                false
            }
            Gate::Pending { missed: false } => {
                gate.set(Gate::Active);
                (entry.callback)(initial);
                true
            }
            Gate::Active => true,
        }
    }

    /// Call every active subscriber of `key`. Returns how many were called.
    ///
    /// Callbacks run on a snapshot of the list, outside the registry lock, so
    /// they may subscribe or unsubscribe while being notified. Pending
    /// subscribers are only marked as having missed a value.
    pub fn notify(&self, key: &str, value: Option<&T>) -> usize {
        let snapshot: Vec<Arc<Entry<T>>> = match self.subscribers.lock().get(key) {
            Some(entries) => entries.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for entry in &snapshot {
            let gate = entry.gate.lock();
            match gate.get() {
                Gate::Active => {
                    (entry.callback)(value);
                    delivered += 1;
                }
                Gate::Pending { .. } => gate.set(Gate::Pending { missed: true }),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.subscribers.lock().get(key).map(Vec::len).unwrap_or(0)
    }

    fn insert(self: &Arc<Self>, key: &str, callback: Callback<T>, gate: Gate) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry {
            token,
            callback,
            gate: ReentrantMutex::new(Cell::new(gate)),
        });
        self.subscribers
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(entry);

        let registry: Weak<Self> = Arc::downgrade(self);
        let owned_key = key.to_string();
        let cancel: Cancel = Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(&owned_key, token);
            }
        });

        Subscription {
            key: key.to_string(),
            token,
            cancel: Mutex::new(Some(cancel)),
        }
    }

    fn entry(&self, key: &str, token: u64) -> Option<Arc<Entry<T>>> {
        self.subscribers
            .lock()
            .get(key)?
            .iter()
            .find(|entry| entry.token == token)
            .cloned()
    }

    fn remove(&self, key: &str, token: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(entries) = subscribers.get_mut(key) {
            entries.retain(|entry| entry.token != token);
            if entries.is_empty() {
                subscribers.remove(key);
            }
        }
    }
}

impl<T: 'static> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SubscriberRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("keys", &self.subscribers.lock().len())
            .finish()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping it keeps the callback registered; call [`Subscription::unsubscribe`].
pub struct Subscription {
    key: String,
    token: u64,
    cancel: Mutex<Option<Cancel>>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// Remove exactly this callback. Later calls do nothing.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Callback<i32> {
        let log = log.clone();
        Arc::new(move |value: Option<&i32>| log.lock().push(format!("{}={:?}", name, value)))
    }

    #[test]
    fn notifies_in_registration_order() {
        let registry = Arc::new(SubscriberRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let _a = registry.register("k", recorder(&log, "a"));
        let _b = registry.register("k", recorder(&log, "b"));
        let _other = registry.register("other", recorder(&log, "other"));

        assert_eq!(registry.notify("k", Some(&1)), 2);
        assert_eq!(registry.notify("k", None), 2);
        assert_eq!(*log.lock(), vec!["a=Some(1)", "b=Some(1)", "a=None", "b=None"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_callback() {
        let registry = Arc::new(SubscriberRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let a = registry.register("k", recorder(&log, "a"));
        let _b = registry.register("k", recorder(&log, "b"));

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());
        assert_eq!(registry.subscriber_count("k"), 1);

        registry.notify("k", Some(&5));
        assert_eq!(*log.lock(), vec!["b=Some(5)"]);
    }

    #[test]
    fn callback_may_unsubscribe_itself_during_notify() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new());
        let calls = Arc::new(AtomicU64::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let callback: Callback<i32> = {
            let calls = calls.clone();
            let slot = slot.clone();
            Arc::new(move |_: Option<&i32>| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(subscription) = slot.lock().as_ref() {
                    subscription.unsubscribe();
                }
            })
        };
        *slot.lock() = Some(registry.register("k", callback));

        let log = Arc::new(Mutex::new(Vec::new()));
        let _after = registry.register("k", recorder(&log, "after"));

        registry.notify("k", Some(&1));
        registry.notify("k", Some(&2));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock(), vec!["after=Some(1)", "after=Some(2)"]);
    }

    #[test]
    fn pending_subscriber_waits_for_its_initial_value() {
        let registry = Arc::new(SubscriberRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let pending = registry.register_pending("k", recorder(&log, "p"));
        assert_eq!(registry.notify("k", Some(&1)), 0);
        assert!(log.lock().is_empty());

        // The value read before that notification is stale
        assert!(!registry.activate(&pending, None));
        assert!(log.lock().is_empty());

        assert!(registry.activate(&pending, Some(&1)));
        assert_eq!(registry.notify("k", Some(&2)), 1);
        assert_eq!(*log.lock(), vec!["p=Some(1)", "p=Some(2)"]);
    }

    #[test]
    fn activating_a_cancelled_subscription_is_harmless() {
        let registry = Arc::new(SubscriberRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let pending = registry.register_pending("k", recorder(&log, "p"));
        pending.unsubscribe();

        assert!(registry.activate(&pending, Some(&1)));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new());
        let subscription = registry.register("k", Arc::new(|_: Option<&i32>| {}));
        drop(registry);
        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }
}
