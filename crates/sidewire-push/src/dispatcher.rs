//! The dispatcher: per-kind subscriber lists and fan-out.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use sidewire_protocol::{PushKind, PushNotification};
use tokio::sync::mpsc;

/// Error a push callback may return. Logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A push callback.
pub type PushHandler = Arc<dyn Fn(&PushNotification) -> Result<(), HandlerError> + Send + Sync>;

/// Identifies one subscription so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of delivering one notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that accepted the notification.
    pub delivered: usize,
    /// Subscribers that failed, panicked, or whose receiver is gone.
    pub failed: usize,
}

#[derive(Clone)]
enum Subscriber {
    Callback(PushHandler),
    Channel(mpsc::UnboundedSender<PushNotification>),
}

/// Routes push notifications to subscribers by [`PushKind`].
///
/// Shared between the client (which subscribes on behalf of the
/// application) and the reader task (which dispatches). The lock is held
/// only to copy or edit subscriber lists, never while a callback runs, so
/// a callback may itself subscribe or unsubscribe.
pub struct PushDispatcher {
    next_id: AtomicU64,
    channels: Mutex<HashMap<PushKind, Vec<(SubscriptionId, Subscriber)>>>,
}

impl PushDispatcher {
    /// Creates a dispatcher with no subscribers.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a callback for one kind of push.
    pub fn subscribe_fn<F>(&self, kind: PushKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PushNotification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert(kind, Subscriber::Callback(Arc::new(handler)))
    }

    /// Registers a channel for one kind of push and returns its receiving
    /// end. Dropping the receiver ends the subscription at the next
    /// dispatch of that kind.
    pub fn subscribe(
        &self,
        kind: PushKind,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<PushNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.insert(kind, Subscriber::Channel(tx));
        (id, rx)
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut channels = self.lock();
        for subscribers in channels.values_mut() {
            if let Some(pos) = subscribers.iter().position(|(sid, _)| *sid == id) {
                subscribers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of subscribers currently registered for `kind`.
    pub fn subscriber_count(&self, kind: PushKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Delivers a notification to every subscriber of its kind.
    pub fn dispatch(&self, push: &PushNotification) -> DispatchReport {
        let subscribers = match self.lock().get(&push.kind) {
            Some(list) => list.clone(),
            None => Vec::new(),
        };

        let mut report = DispatchReport::default();
        let mut closed = Vec::new();

        for (id, subscriber) in subscribers {
            match subscriber {
                Subscriber::Callback(handler) => {
                    match catch_unwind(AssertUnwindSafe(|| handler(push))) {
                        Ok(Ok(())) => report.delivered += 1,
                        Ok(Err(e)) => {
                            report.failed += 1;
                            tracing::warn!(
                                subscription = %id,
                                kind = %push.kind,
                                category = %push.category,
                                error = %e,
                                "push handler failed"
                            );
                        }
                        Err(_) => {
                            report.failed += 1;
                            tracing::warn!(
                                subscription = %id,
                                kind = %push.kind,
                                category = %push.category,
                                "push handler panicked"
                            );
                        }
                    }
                }
                Subscriber::Channel(tx) => {
                    if tx.send(push.clone()).is_ok() {
                        report.delivered += 1;
                    } else {
                        report.failed += 1;
                        closed.push(id);
                    }
                }
            }
        }

        for id in closed {
            tracing::debug!(subscription = %id, "dropping closed push subscription");
            self.unsubscribe(id);
        }

        tracing::trace!(
            kind = %push.kind,
            delivered = report.delivered,
            failed = report.failed,
            "push dispatched"
        );
        report
    }

    fn insert(&self, kind: PushKind, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(kind).or_default().push((id, subscriber));
        tracing::debug!(subscription = %id, %kind, "push subscription added");
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PushKind, Vec<(SubscriptionId, Subscriber)>>> {
        // A panicking callback never runs under this lock, so poisoning
        // can only come from a bug here; the map itself stays consistent.
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PushDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PushDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.lock();
        let counts: HashMap<PushKind, usize> =
            channels.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("PushDispatcher")
            .field("subscribers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use serde_json::json;

    use super::*;

    fn push(category: &str) -> PushNotification {
        PushNotification::new(category, "", json!({ "name": "alex" }))
    }

    /// A callback that appends `tag` to a shared log.
    fn recorder(
        log: &Arc<StdMutex<Vec<&'static str>>>,
        tag: &'static str,
    ) -> impl Fn(&PushNotification) -> Result<(), HandlerError> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_| {
            log.lock().unwrap().push(tag);
            Ok(())
        }
    }

    #[test]
    fn test_delivers_only_to_matching_kind() {
        let d = PushDispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        d.subscribe_fn(PushKind::IdentityJoined, recorder(&log, "joined"));
        d.subscribe_fn(PushKind::IdentityLeft, recorder(&log, "left"));
        d.subscribe_fn(PushKind::Generic, recorder(&log, "generic"));

        let report = d.dispatch(&push("playerLogin"));

        assert_eq!(report, DispatchReport { delivered: 1, failed: 0 });
        assert_eq!(*log.lock().unwrap(), vec!["joined"]);
    }

    #[test]
    fn test_unknown_category_goes_to_generic() {
        let d = PushDispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        d.subscribe_fn(PushKind::IdentityJoined, recorder(&log, "joined"));
        d.subscribe_fn(PushKind::Generic, recorder(&log, "generic"));

        d.dispatch(&push("somethingNew"));

        assert_eq!(*log.lock().unwrap(), vec!["generic"]);
    }

    #[test]
    fn test_delivers_in_subscription_order() {
        let d = PushDispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        d.subscribe_fn(PushKind::MenuTriggered, recorder(&log, "first"));
        d.subscribe_fn(PushKind::MenuTriggered, recorder(&log, "second"));
        d.subscribe_fn(PushKind::MenuTriggered, recorder(&log, "third"));

        d.dispatch(&push("menuTriggered"));

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_handler_does_not_stop_delivery() {
        let d = PushDispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        d.subscribe_fn(PushKind::DataFeed, |_| Err("boom".into()));
        d.subscribe_fn(PushKind::DataFeed, recorder(&log, "after-error"));

        let report = d.dispatch(&push("mcPkt"));

        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(*log.lock().unwrap(), vec!["after-error"]);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_delivery() {
        let d = PushDispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        d.subscribe_fn(PushKind::WorldStateChanged, |_| panic!("handler bug"));
        d.subscribe_fn(PushKind::WorldStateChanged, recorder(&log, "survivor"));

        let report = d.dispatch(&push("blockUpdate"));

        assert_eq!(report.failed, 1);
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn test_channel_subscriber_receives_notification() {
        let d = PushDispatcher::new();
        let (_id, mut rx) = d.subscribe(PushKind::IdentityLeft);

        d.dispatch(&push("playerLogout"));

        let got = rx.try_recv().expect("should have a notification");
        assert_eq!(got.kind, PushKind::IdentityLeft);
        assert_eq!(got.data["name"], "alex");
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let d = PushDispatcher::new();
        let (_id, rx) = d.subscribe(PushKind::IdentityLeft);
        drop(rx);
        assert_eq!(d.subscriber_count(PushKind::IdentityLeft), 1);

        let report = d.dispatch(&push("playerLogout"));

        assert_eq!(report.failed, 1);
        assert_eq!(d.subscriber_count(PushKind::IdentityLeft), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let d = PushDispatcher::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let id = d.subscribe_fn(PushKind::IdentityJoined, recorder(&log, "gone"));

        assert!(d.unsubscribe(id));
        assert!(!d.unsubscribe(id));
        d.dispatch(&push("playerLogin"));

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handler_may_subscribe_during_dispatch() {
        let d = Arc::new(PushDispatcher::new());
        let inner = Arc::clone(&d);
        d.subscribe_fn(PushKind::Generic, move |_| {
            inner.subscribe_fn(PushKind::Generic, |_| Ok(()));
            Ok(())
        });

        let report = d.dispatch(&push("x"));

        assert_eq!(report.delivered, 1);
        assert_eq!(d.subscriber_count(PushKind::Generic), 2);
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let d = PushDispatcher::new();
        assert_eq!(d.dispatch(&push("playerLogin")), DispatchReport::default());
    }
}
