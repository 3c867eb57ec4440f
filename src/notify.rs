// THEORY:
// The `notify` module is the outbound side of transitions. People subscribe for
// a limited time ("tell me for the next hour when the table frees up"); the
// store keeps one subscription per person and a periodic sweep drops the ones
// whose time is up.
//
// Delivery is decoupled from detection through a broadcast bus: the capture
// task publishes one `Delivery` per active subscriber and never waits on
// whoever consumes them. A slow consumer only loses its own backlog.
// Subscribers pick up their own deliveries through `deliveries_for`, which the
// HTTP server exposes as an event stream.

use crate::core_modules::transition::{NotificationDispatch, TransitionEvent};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// How often expired subscriptions are removed.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(5);
/// Deliveries buffered per bus receiver.
pub const BUS_CAPACITY: usize = 64;

/// A time-limited request to hear about transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created,
    Replaced,
}

/// One subscription per id.
#[derive(Debug, Default)]
pub struct SubscriberStore {
    entries: Mutex<HashMap<String, Subscription>>,
}

impl SubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Subscription>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `subscription`, overwriting any existing one for the same id.
    pub fn subscribe(&self, subscription: Subscription) -> SubscribeOutcome {
        let id = subscription.id.clone();
        match self.entries().insert(id, subscription) {
            Some(_) => SubscribeOutcome::Replaced,
            None => SubscribeOutcome::Created,
        }
    }

    pub fn cancel(&self, id: &str) -> Option<Subscription> {
        self.entries().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.entries().get(id).cloned()
    }

    /// Subscriptions that have not expired at `now`.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<Subscription> {
        self.entries()
            .values()
            .filter(|subscription| subscription.is_active(now))
            .cloned()
            .collect()
    }

    /// Drops expired subscriptions. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, subscription| subscription.is_active(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// A message addressed to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub subscriber_id: String,
    pub message: String,
}

#[derive(Clone)]
pub struct NotificationBus {
    pub deliveries_tx: broadcast::Sender<Delivery>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (deliveries_tx, _) = broadcast::channel::<Delivery>(capacity.max(1));
        Self { deliveries_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.deliveries_tx.subscribe()
    }

    /// Sends without waiting. Returns false when nobody is listening.
    pub fn publish(&self, delivery: Delivery) -> bool {
        self.deliveries_tx.send(delivery).is_ok()
    }
}

/// Fans each transition out to every active subscriber over the bus.
#[derive(Clone)]
pub struct SubscriberDispatch {
    store: Arc<SubscriberStore>,
    bus: NotificationBus,
}

impl SubscriberDispatch {
    pub fn new(store: Arc<SubscriberStore>, bus: NotificationBus) -> Self {
        Self { store, bus }
    }

    /// Publishes `event` to subscribers active at `now`. Returns the recipient count.
    pub fn dispatch_at(&self, event: &TransitionEvent, now: DateTime<Utc>) -> usize {
        let recipients = self.store.active(now);
        for subscription in &recipients {
            let delivered = self.bus.publish(Delivery {
                subscriber_id: subscription.id.clone(),
                message: event.message().to_string(),
            });
            if !delivered {
                tracing::warn!(subscriber = %subscription.id, "No delivery consumer attached");
            }
        }
        recipients.len()
    }
}

impl NotificationDispatch for SubscriberDispatch {
    fn dispatch(&self, event: &TransitionEvent) {
        let sent = self.dispatch_at(event, Utc::now());
        tracing::debug!(recipients = sent, "Dispatched transition");
    }
}

/// Periodically removes expired subscriptions. Runs until the task is dropped.
pub async fn run_expiry_sweep(store: Arc<SubscriberStore>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let removed = store.sweep(Utc::now());
        if removed > 0 {
            tracing::info!(removed, remaining = store.len(), "Expired subscriptions removed");
        }
    }
}

/// Logs every delivery until the bus closes.
pub async fn log_deliveries(mut rx: broadcast::Receiver<Delivery>) {
    loop {
        match rx.recv().await {
            Ok(delivery) => {
                tracing::info!(
                    subscriber = %delivery.subscriber_id,
                    message = %delivery.message,
                    "Notification delivered"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Delivery log fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Messages addressed to `subscriber_id`, in publish order. Ends when the bus closes.
pub fn deliveries_for(
    rx: broadcast::Receiver<Delivery>,
    subscriber_id: String,
) -> impl Stream<Item = String> + Send + 'static {
    futures::stream::unfold((rx, subscriber_id), |(mut rx, subscriber_id)| async move {
        loop {
            match rx.recv().await {
                Ok(delivery) if delivery.subscriber_id == subscriber_id => {
                    return Some((delivery.message, (rx, subscriber_id)));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(subscriber = %subscriber_id, skipped, "Notification stream fell behind");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use futures::StreamExt;

    fn subscription(id: &str, expires_at: DateTime<Utc>) -> Subscription {
        Subscription {
            id: id.to_string(),
            name: format!("user {id}"),
            expires_at,
        }
    }

    #[test]
    fn resubscribing_replaces_the_entry() {
        let store = SubscriberStore::new();
        let now = Utc::now();
        assert_eq!(store.subscribe(subscription("a", now + TimeDelta::minutes(10))), SubscribeOutcome::Created);
        assert_eq!(store.subscribe(subscription("a", now + TimeDelta::hours(2))), SubscribeOutcome::Replaced);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().expires_at, now + TimeDelta::hours(2));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let store = SubscriberStore::new();
        let now = Utc::now();
        store.subscribe(subscription("old", now - TimeDelta::seconds(1)));
        store.subscribe(subscription("edge", now));
        store.subscribe(subscription("fresh", now + TimeDelta::minutes(1)));

        assert_eq!(store.sweep(now), 2);
        assert!(store.get("fresh").is_some());
        assert!(store.get("old").is_none());
        assert_eq!(store.sweep(now), 0);
    }

    #[test]
    fn cancel_removes_the_subscription() {
        let store = SubscriberStore::new();
        store.subscribe(subscription("a", Utc::now() + TimeDelta::days(1)));
        assert!(store.cancel("a").is_some());
        assert!(store.cancel("a").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn dispatch_skips_expired_subscribers() {
        let store = Arc::new(SubscriberStore::new());
        let bus = NotificationBus::new(BUS_CAPACITY);
        let mut rx = bus.subscribe();
        let now = Utc::now();
        store.subscribe(subscription("expired", now - TimeDelta::minutes(1)));
        store.subscribe(subscription("listening", now + TimeDelta::minutes(1)));

        let dispatch = SubscriberDispatch::new(Arc::clone(&store), bus);
        assert_eq!(dispatch.dispatch_at(&TransitionEvent::BecameFree, now), 1);

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.subscriber_id, "listening");
        assert_eq!(delivery.message, "The pool table is now free");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sweep_task_removes_expired_entries() {
        let store = Arc::new(SubscriberStore::new());
        store.subscribe(subscription("gone", Utc::now() - TimeDelta::seconds(1)));

        // The first interval tick fires immediately.
        let task = tokio::spawn(run_expiry_sweep(Arc::clone(&store), SWEEP_PERIOD));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.is_empty());
        task.abort();
    }

    #[tokio::test]
    async fn subscriber_stream_yields_only_its_own_messages() {
        let store = Arc::new(SubscriberStore::new());
        let bus = NotificationBus::new(BUS_CAPACITY);
        let now = Utc::now();
        store.subscribe(subscription("U1", now + TimeDelta::hours(1)));
        store.subscribe(subscription("U2", now + TimeDelta::hours(1)));

        let stream = deliveries_for(bus.subscribe(), "U1".to_string());
        let dispatch = SubscriberDispatch::new(Arc::clone(&store), bus.clone());
        assert_eq!(dispatch.dispatch_at(&TransitionEvent::BecameFree, now), 2);
        assert_eq!(dispatch.dispatch_at(&TransitionEvent::BecameBusy, now), 2);
        drop(dispatch);
        drop(bus);

        let messages: Vec<String> = stream.collect().await;
        assert_eq!(messages, ["The pool table is now free", "The pool table is no longer free"]);
    }
}
