use std::{
    collections::HashMap,
    convert::Infallible,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use axum::response::sse::Event;
use metrics::gauge;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_stream::{
    wrappers::{BroadcastStream, WatchStream},
    Stream, StreamExt,
};

use joblane_core::types::Message;

const BROADCAST_BUFFER: usize = 256;
const MESSAGE_EVENT: &str = "message";
const UNREAD_EVENT: &str = "unread";

/// The two live streams exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Messages,
    UnreadCount,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Messages => "messages",
            StreamKind::UnreadCount => "unread",
        }
    }
}

/// In-process fan-out hub for the two subscription surfaces: per
/// conversation message feeds and per user unread-count feeds.
///
/// A subscription is an explicit resource: the returned stream holds a
/// drop guard, and cancelling means dropping the stream. Nothing about a
/// cancellation touches stored data.
#[derive(Clone, Default)]
pub struct LiveHub {
    message_channels: Arc<RwLock<HashMap<String, broadcast::Sender<Arc<Message>>>>>,
    unread_channels: Arc<RwLock<HashMap<String, watch::Sender<u64>>>>,
    counters: Arc<ClientCounters>,
}

impl LiveHub {
    pub fn new() -> Self {
        Self::default()
    }

    async fn message_sender(&self, conversation_id: &str) -> broadcast::Sender<Arc<Message>> {
        let mut guard = self.message_channels.write().await;
        guard
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_BUFFER).0)
            .clone()
    }

    /// Publishes a freshly appended message to live subscribers. Fire and
    /// forget: a conversation nobody watches simply drops the value.
    pub async fn publish_message(&self, message: Message) {
        let sender = self.message_sender(&message.conversation_id).await;
        let _ = sender.send(Arc::new(message));
    }

    /// Opens a message subscription for the conversation.
    ///
    /// Call this BEFORE reading the stored backlog: the live receiver is
    /// attached first, and [`MessageSubscription::into_stream`] later drops
    /// every live entry whose sequence is already covered by the backlog,
    /// so a message landing between the two steps is delivered exactly
    /// once.
    pub async fn subscribe_messages(&self, conversation_id: &str) -> MessageSubscription {
        let sender = self.message_sender(conversation_id).await;
        let guard = ClientGuard::new(self.counters.clone(), StreamKind::Messages);
        MessageSubscription {
            receiver: BroadcastStream::new(sender.subscribe()),
            guard,
        }
    }

    /// Publishes a new unread count for the user.
    pub async fn publish_unread(&self, user_id: &str, count: u64) {
        let mut guard = self.unread_channels.write().await;
        match guard.get(user_id) {
            Some(sender) => {
                sender.send_replace(count);
            }
            None => {
                let (sender, _) = watch::channel(count);
                guard.insert(user_id.to_string(), sender);
            }
        }
    }

    /// Opens an unread-count subscription. The stream yields the current
    /// count immediately and a new value on every change. `initial` is the
    /// count read from storage and refreshes a channel that has never been
    /// published to.
    pub async fn subscribe_unread(&self, user_id: &str, initial: u64) -> UnreadSubscription {
        let receiver = {
            let mut guard = self.unread_channels.write().await;
            let sender = guard
                .entry(user_id.to_string())
                .or_insert_with(|| watch::channel(initial).0);
            sender.send_if_modified(|value| {
                if *value != initial {
                    *value = initial;
                    true
                } else {
                    false
                }
            });
            sender.subscribe()
        };
        let guard = ClientGuard::new(self.counters.clone(), StreamKind::UnreadCount);
        UnreadSubscription { receiver, guard }
    }
}

/// Live message feed, not yet spliced with the stored backlog.
pub struct MessageSubscription {
    receiver: BroadcastStream<Arc<Message>>,
    guard: ClientGuard,
}

impl MessageSubscription {
    /// Splices the stored backlog (send order) with the live feed. Live
    /// entries at or below the last backlog sequence are duplicates of
    /// rows already delivered and are dropped.
    pub fn into_stream(self, backlog: Vec<Message>) -> SseStream {
        let last_seq = backlog.last().map(|message| message.seq).unwrap_or(0);

        let backlog_stream =
            tokio_stream::iter(backlog).map(|message| Ok::<_, Infallible>(message_event(&message)));

        let live_stream = self.receiver.filter_map(move |result| match result {
            Ok(message) if message.seq > last_seq => Some(Ok(message_event(&message))),
            _ => None,
        });

        let stream = backlog_stream.chain(live_stream);
        SseStream {
            inner: Box::pin(stream),
            _guard: self.guard,
        }
    }
}

/// Live unread-count feed.
pub struct UnreadSubscription {
    receiver: watch::Receiver<u64>,
    guard: ClientGuard,
}

impl UnreadSubscription {
    pub fn into_stream(self) -> SseStream {
        let stream = WatchStream::new(self.receiver)
            .map(|count| Ok::<_, Infallible>(Event::default().event(UNREAD_EVENT).data(count.to_string())));
        SseStream {
            inner: Box::pin(stream),
            _guard: self.guard,
        }
    }
}

fn message_event(message: &Message) -> Event {
    let data = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    Event::default()
        .id(message.seq.to_string())
        .event(MESSAGE_EVENT)
        .data(data)
}

pub struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>,
    _guard: ClientGuard,
}

impl Stream for SseStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.inner.as_mut().poll_next(cx)
    }
}

#[derive(Default)]
struct ClientCounters {
    messages: AtomicUsize,
    unread: AtomicUsize,
}

impl ClientCounters {
    fn increment(&self, kind: StreamKind) {
        let value = match kind {
            StreamKind::Messages => self.messages.fetch_add(1, Ordering::SeqCst) + 1,
            StreamKind::UnreadCount => self.unread.fetch_add(1, Ordering::SeqCst) + 1,
        };
        gauge!("sse_clients", "kind" => kind.as_str()).set(value as f64);
    }

    fn decrement(&self, kind: StreamKind) {
        let value = match kind {
            StreamKind::Messages => self.messages.fetch_sub(1, Ordering::SeqCst).saturating_sub(1),
            StreamKind::UnreadCount => self.unread.fetch_sub(1, Ordering::SeqCst).saturating_sub(1),
        };
        gauge!("sse_clients", "kind" => kind.as_str()).set(value as f64);
    }
}

struct ClientGuard {
    counters: Arc<ClientCounters>,
    kind: StreamKind,
}

impl ClientGuard {
    fn new(counters: Arc<ClientCounters>, kind: StreamKind) -> Self {
        counters.increment(kind);
        Self { counters, kind }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.counters.decrement(self.kind);
    }
}
