//! Memory-pressure notifications
//!
//! The host delivers low-memory events through a [`PressureSource`].
//! Subscribers get a [`PressureSubscription`] guard that unsubscribes when
//! dropped, so a subscription never outlives its owner.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

/// Callback run synchronously when memory pressure is signalled
pub type PressureHandler = Arc<dyn Fn() + Send + Sync>;

/// Identifies one subscription on a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Source of memory-pressure events provided by the host environment
pub trait PressureSource: Send + Sync {
    /// Register `handler`; it runs before the notification returns
    fn subscribe(&self, handler: PressureHandler) -> SubscriptionId;

    /// Remove a handler. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// In-process pressure source driven by explicit [`PressureNotifier::notify`] calls
#[derive(Default)]
pub struct PressureNotifier {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(SubscriptionId, PressureHandler)>>,
}

impl PressureNotifier {
    /// Create a notifier with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every registered handler on the calling thread
    pub fn notify(&self) {
        // Snapshot first so handlers may unsubscribe without deadlocking
        let handlers: Vec<PressureHandler> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        info!("Memory pressure signalled, notifying {} subscriber(s)", handlers.len());
        for handler in handlers {
            handler();
        }
    }

    /// Number of live subscriptions
    pub fn subscribers(&self) -> usize {
        self.handlers.read().len()
    }
}

impl PressureSource for PressureNotifier {
    fn subscribe(&self, handler: PressureHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers.write().retain(|(sub, _)| *sub != id);
    }
}

/// Live subscription; unsubscribes on drop
pub struct PressureSubscription {
    source: Arc<dyn PressureSource>,
    id: SubscriptionId,
}

impl PressureSubscription {
    /// Subscribe `handler` to `source`
    pub fn new(source: Arc<dyn PressureSource>, handler: PressureHandler) -> Self {
        let id = source.subscribe(handler);
        Self { source, id }
    }

    /// Subscription id
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for PressureSubscription {
    fn drop(&mut self) {
        self.source.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> PressureHandler {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_notify_runs_handlers() {
        let notifier = Arc::new(PressureNotifier::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let _a = PressureSubscription::new(notifier.clone(), counting_handler(&counter));
        let _b = PressureSubscription::new(notifier.clone(), counting_handler(&counter));
        notifier.notify();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let notifier = Arc::new(PressureNotifier::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let sub = PressureSubscription::new(notifier.clone(), counting_handler(&counter));
        assert_eq!(notifier.subscribers(), 1);
        drop(sub);
        assert_eq!(notifier.subscribers(), 0);

        notifier.notify();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let notifier = Arc::new(PressureNotifier::new());
        let slot: Arc<parking_lot::Mutex<Option<PressureSubscription>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let inner = Arc::clone(&slot);
        let sub = PressureSubscription::new(
            notifier.clone(),
            Arc::new(move || {
                inner.lock().take();
            }),
        );
        *slot.lock() = Some(sub);

        notifier.notify();
        assert_eq!(notifier.subscribers(), 0);
    }
}
