//! Update Router
//!
//! Fans un-correlated updates out to subscribers. Delivery is synchronous
//! and in registration order: `publish` returns only after every matching
//! subscriber has seen the update, so the dispatch loop never starts on the
//! next frame early.

use futures::Stream;
use parking_lot::RwLock;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tether_core::object::value_as_i64;
use tether_core::TaggedObject;
use tokio::sync::mpsc;

type Handler = Box<dyn Fn(&TaggedObject) + Send + Sync>;
type Predicate = Arc<dyn Fn(&TaggedObject) -> bool + Send + Sync>;

/// Which updates a subscriber wants
#[derive(Clone)]
pub enum UpdateFilter {
    /// Every update
    All,
    /// Exactly this tag
    Tag(String),
    /// Tags starting with this prefix
    TagPrefix(String),
    /// Updates carrying `id` at the dotted `path` (number or decimal string)
    Entity {
        /// Dotted field path, e.g. `message.chat_id`
        path: String,
        /// Entity id to match
        id: i64,
    },
    /// Any of the inner filters
    Any(Vec<UpdateFilter>),
    /// Arbitrary predicate
    Custom(Predicate),
}

impl UpdateFilter {
    /// Match one tag
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag(tag.into())
    }

    /// Match a tag prefix
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::TagPrefix(prefix.into())
    }

    /// Match an entity id at a dotted path
    pub fn entity(path: impl Into<String>, id: i64) -> Self {
        Self::Entity {
            path: path.into(),
            id,
        }
    }

    /// Updates about one chat, whether it is named directly or through the
    /// message they carry
    pub fn chat(chat_id: i64) -> Self {
        Self::Any(vec![
            Self::entity("chat_id", chat_id),
            Self::entity("message.chat_id", chat_id),
        ])
    }

    /// Match with a closure
    pub fn custom(predicate: impl Fn(&TaggedObject) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    /// Whether `update` passes this filter
    pub fn matches(&self, update: &TaggedObject) -> bool {
        match self {
            Self::All => true,
            Self::Tag(tag) => update.tag() == tag,
            Self::TagPrefix(prefix) => update.tag().starts_with(prefix.as_str()),
            Self::Entity { path, id } => update
                .lookup(path)
                .and_then(value_as_i64)
                .is_some_and(|found| found == *id),
            Self::Any(filters) => filters.iter().any(|filter| filter.matches(update)),
            Self::Custom(predicate) => predicate(update),
        }
    }
}

impl std::fmt::Debug for UpdateFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Tag(tag) => f.debug_tuple("Tag").field(tag).finish(),
            Self::TagPrefix(prefix) => f.debug_tuple("TagPrefix").field(prefix).finish(),
            Self::Entity { path, id } => f
                .debug_struct("Entity")
                .field("path", path)
                .field("id", id)
                .finish(),
            Self::Any(filters) => f.debug_tuple("Any").field(filters).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Identifies a subscription for [`UpdateRouter::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

enum Sink {
    Callback(Handler),
    Channel(mpsc::UnboundedSender<TaggedObject>),
}

struct Subscriber {
    id: u64,
    filter: UpdateFilter,
    sink: Sink,
    permanent: bool,
}

impl Subscriber {
    /// Returns `false` if the sink is gone and the subscriber can be pruned.
    fn deliver(&self, update: &TaggedObject) -> bool {
        match &self.sink {
            Sink::Callback(handler) => {
                handler(update);
                true
            }
            Sink::Channel(tx) => tx.send(update.clone()).is_ok(),
        }
    }

    fn is_gone(&self) -> bool {
        matches!(&self.sink, Sink::Channel(tx) if tx.is_closed())
    }
}

#[derive(Default)]
struct RouterState {
    subscribers: Vec<Arc<Subscriber>>,
    /// Terminal update, set once by `close`.
    last: Option<TaggedObject>,
}

/// Update fan-out
#[derive(Default)]
pub struct UpdateRouter {
    state: RwLock<RouterState>,
    next_id: AtomicU64,
}

impl UpdateRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for updates passing `filter`
    pub fn subscribe(
        &self,
        filter: UpdateFilter,
        handler: impl Fn(&TaggedObject) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.insert(filter, Sink::Callback(Box::new(handler)), false)
    }

    /// Register a handler that [`unsubscribe`](Self::unsubscribe) will not
    /// remove
    pub fn subscribe_permanent(
        &self,
        filter: UpdateFilter,
        handler: impl Fn(&TaggedObject) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.insert(filter, Sink::Callback(Box::new(handler)), true)
    }

    /// Receive updates passing `filter` as a stream. The stream ends when
    /// the router closes or the subscription is removed.
    pub fn subscribe_stream(&self, filter: UpdateFilter) -> UpdateStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.insert(filter, Sink::Channel(tx), false);
        UpdateStream { handle, rx }
    }

    /// Remove a subscription. Returns `false` for unknown or permanent
    /// handles.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut state = self.state.write();
        let before = state.subscribers.len();
        state
            .subscribers
            .retain(|sub| sub.permanent || sub.id != handle.0);
        state.subscribers.len() != before
    }

    /// Deliver one update to every matching subscriber, in registration
    /// order. Returns the number of deliveries.
    ///
    /// Streams whose receiver was dropped are pruned whatever their filter.
    pub fn publish(&self, update: &TaggedObject) -> usize {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let snapshot: Vec<Arc<Subscriber>> = {
            let state = self.state.read();
            if state.last.is_some() {
                return 0;
            }
            state.subscribers.clone()
        };

        let mut delivered = 0;
        let mut gone = Vec::new();
        for sub in &snapshot {
            if sub.is_gone() {
                gone.push(sub.id);
            } else if sub.filter.matches(update) {
                if sub.deliver(update) {
                    delivered += 1;
                } else {
                    gone.push(sub.id);
                }
            }
        }
        if !gone.is_empty() {
            self.state
                .write()
                .subscribers
                .retain(|sub| !gone.contains(&sub.id));
        }
        delivered
    }

    /// Deliver `last` to every subscriber regardless of filter, then drop
    /// them all. Later publishes are ignored; later subscribers receive
    /// `last` and end at once.
    pub fn close(&self, last: &TaggedObject) {
        let subscribers = {
            let mut state = self.state.write();
            if state.last.is_some() {
                return;
            }
            state.last = Some(last.clone());
            std::mem::take(&mut state.subscribers)
        };
        for sub in &subscribers {
            sub.deliver(last);
        }
        tracing::debug!(subscribers = subscribers.len(), "update router closed");
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.state.read().subscribers.len()
    }

    /// Whether there are no subscriptions
    pub fn is_empty(&self) -> bool {
        self.state.read().subscribers.is_empty()
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.state.read().last.is_some()
    }

    fn insert(&self, filter: UpdateFilter, sink: Sink, permanent: bool) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscriber {
            id,
            filter,
            sink,
            permanent,
        });

        let last = {
            let mut state = self.state.write();
            match &state.last {
                Some(last) => last.clone(),
                None => {
                    state.subscribers.retain(|sub| !sub.is_gone());
                    state.subscribers.push(sub);
                    return SubscriptionHandle(id);
                }
            }
        };
        // Closed already: hand over the terminal update and drop the sink.
        sub.deliver(&last);
        SubscriptionHandle(id)
    }
}

/// Updates delivered to one stream subscription
#[derive(Debug)]
pub struct UpdateStream {
    handle: SubscriptionHandle,
    rx: mpsc::UnboundedReceiver<TaggedObject>,
}

impl UpdateStream {
    /// Handle of the underlying subscription
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Next update, or `None` once the subscription ended
    pub async fn recv(&mut self) -> Option<TaggedObject> {
        self.rx.recv().await
    }

    /// Next update if one is already queued
    pub fn try_recv(&mut self) -> Option<TaggedObject> {
        self.rx.try_recv().ok()
    }
}

impl Stream for UpdateStream {
    type Item = TaggedObject;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn update(value: serde_json::Value) -> TaggedObject {
        TaggedObject::from_value(value).unwrap()
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let router = UpdateRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let log = log.clone();
            router.subscribe(UpdateFilter::All, move |u| {
                log.lock().push(format!("{name}:{}", u.tag()));
            });
        }

        assert_eq!(router.publish(&TaggedObject::new("updateA")), 3);
        assert_eq!(router.publish(&TaggedObject::new("updateB")), 3);
        assert_eq!(
            *log.lock(),
            [
                "first:updateA",
                "second:updateA",
                "third:updateA",
                "first:updateB",
                "second:updateB",
                "third:updateB"
            ]
        );
    }

    #[test]
    fn test_filters() {
        let message = update(json!({
            "@type": "updateNewMessage",
            "message": {"@type": "message", "id": 1, "chat_id": "42"}
        }));
        let title = update(json!({"@type": "updateChatTitle", "chat_id": 7, "title": "x"}));

        assert!(UpdateFilter::tag("updateNewMessage").matches(&message));
        assert!(!UpdateFilter::tag("updateNewMessage").matches(&title));
        assert!(UpdateFilter::prefix("updateChat").matches(&title));
        assert!(UpdateFilter::entity("message.chat_id", 42).matches(&message));
        assert!(!UpdateFilter::entity("message.chat_id", 43).matches(&message));
        assert!(UpdateFilter::chat(7).matches(&title));
        assert!(UpdateFilter::chat(42).matches(&message));
        assert!(!UpdateFilter::chat(42).matches(&title));
        assert!(UpdateFilter::custom(|u| u.get_str("title") == Some("x")).matches(&title));
    }

    #[test]
    fn test_unsubscribe_and_permanent() {
        let router = UpdateRouter::new();
        let permanent = router.subscribe_permanent(UpdateFilter::All, |_| {});
        let regular = router.subscribe(UpdateFilter::All, |_| {});
        assert_eq!(router.len(), 2);

        assert!(!router.unsubscribe(permanent));
        assert!(router.unsubscribe(regular));
        assert!(!router.unsubscribe(regular));
        assert_eq!(router.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_subscription_and_close() {
        let router = UpdateRouter::new();
        let mut chats = router.subscribe_stream(UpdateFilter::prefix("updateChat"));

        router.publish(&TaggedObject::new("updateOption"));
        router.publish(&TaggedObject::new("updateChatTitle"));
        router.close(&TaggedObject::new("updateAuthorizationState"));
        router.publish(&TaggedObject::new("updateChatTitle"));

        assert_eq!(chats.recv().await.unwrap().tag(), "updateChatTitle");
        assert_eq!(chats.recv().await.unwrap().tag(), "updateAuthorizationState");
        assert!(chats.recv().await.is_none());
        assert!(router.is_empty());
    }

    #[test]
    fn test_dropped_streams_are_pruned_whatever_their_filter() {
        let router = UpdateRouter::new();
        let kept = router.subscribe_stream(UpdateFilter::All);
        for _ in 0..1000 {
            drop(router.subscribe_stream(UpdateFilter::tag("updateNeverSent")));
        }
        // Each insert prunes the previously dropped stream.
        assert_eq!(router.len(), 2);

        drop(router.subscribe_stream(UpdateFilter::tag("updateNeverSent")));
        assert_eq!(router.publish(&TaggedObject::new("updateOption")), 1);
        assert_eq!(router.len(), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn test_subscribing_after_close_sees_terminal_update() {
        let router = UpdateRouter::new();
        router.close(&TaggedObject::new("updateAuthorizationState"));

        let mut late = router.subscribe_stream(UpdateFilter::tag("updateOption"));
        assert_eq!(late.recv().await.unwrap().tag(), "updateAuthorizationState");
        assert!(late.recv().await.is_none());

        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        router.subscribe(UpdateFilter::All, move |_| *counter.lock() += 1);
        assert_eq!(*seen.lock(), 1);
        assert!(router.is_empty());
    }

    #[test]
    fn test_concurrent_subscribe_and_close_never_strands_a_stream() {
        for _ in 0..50 {
            let router = Arc::new(UpdateRouter::new());
            let subscribers: Vec<_> = (0..4)
                .map(|_| {
                    let router = router.clone();
                    std::thread::spawn(move || {
                        (0..25)
                            .map(|_| router.subscribe_stream(UpdateFilter::tag("updateOption")))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            router.close(&TaggedObject::new("updateAuthorizationState"));

            for handle in subscribers {
                for mut stream in handle.join().unwrap() {
                    let last = stream.try_recv().unwrap();
                    assert_eq!(last.tag(), "updateAuthorizationState");
                    assert!(stream.try_recv().is_none());
                }
            }
            assert!(router.is_empty());
        }
    }

    #[test]
    fn test_dropped_stream_is_pruned() {
        let router = UpdateRouter::new();
        let stream = router.subscribe_stream(UpdateFilter::All);
        drop(stream);
        assert_eq!(router.len(), 1);
        assert_eq!(router.publish(&TaggedObject::new("updateOption")), 0);
        assert!(router.is_empty());
    }
}
