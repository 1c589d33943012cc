use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_core::Stream;
use telelink_message::{Packet, ALL_TOPIC};
use tokio::sync::mpsc;

/// Identifies one registration in a [`SubscriptionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// A process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Where a subscription's packets go.
pub enum Sink {
    Callback(Box<dyn Fn(&Packet) + Send>),
    Channel(mpsc::UnboundedSender<Packet>),
}

impl Sink {
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&Packet) + Send + 'static,
    {
        Self::Callback(Box::new(callback))
    }

    /// A channel sink and the stream that receives from it.
    pub fn channel() -> (Self, PacketStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Channel(tx), PacketStream { rx })
    }

    fn deliver(&self, packet: &Packet) {
        match self {
            Self::Callback(callback) => callback(packet),
            // A dropped stream just stops receiving.
            Self::Channel(tx) => {
                let _ = tx.send(packet.clone());
            }
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Sink::Callback"),
            Self::Channel(_) => f.write_str("Sink::Channel"),
        }
    }
}

/// Packets delivered to a channel-backed subscription.
///
/// Ends once the subscription is removed or the connection shuts down.
#[derive(Debug)]
pub struct PacketStream {
    rx: mpsc::UnboundedReceiver<Packet>,
}

impl PacketStream {
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Next packet if one is already queued.
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.rx.try_recv().ok()
    }
}

impl Stream for PacketStream {
    type Item = Packet;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Packet>> {
        self.rx.poll_recv(cx)
    }
}

/// Outcome of [`SubscriptionTable::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Removal {
    /// The id was registered.
    pub removed: bool,
    /// Its topic has no subscribers left and left the active set.
    pub topic_emptied: bool,
}

/// Topic → subscribers. The key set is the active topic set.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    topics: BTreeMap<String, Vec<(SubscriptionId, Sink)>>,
    index: HashMap<SubscriptionId, String>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, topic: impl Into<String>, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.insert_with_id(id, topic, sink);
        id
    }

    /// Insert under an id minted elsewhere (the connection hands ids out
    /// before the driver sees the registration).
    pub fn insert_with_id(&mut self, id: SubscriptionId, topic: impl Into<String>, sink: Sink) {
        let topic = topic.into();
        self.index.insert(id, topic.clone());
        self.topics.entry(topic).or_default().push((id, sink));
    }

    /// Remove exactly one registration. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: SubscriptionId) -> Removal {
        let Some(topic) = self.index.remove(&id) else {
            return Removal::default();
        };

        let mut topic_emptied = false;
        if let Some(sinks) = self.topics.get_mut(&topic) {
            sinks.retain(|(sink_id, _)| *sink_id != id);
            if sinks.is_empty() {
                self.topics.remove(&topic);
                topic_emptied = true;
            }
        }

        Removal {
            removed: true,
            topic_emptied,
        }
    }

    /// Active topics, sorted.
    pub fn active_topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Number of registrations across all topics.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Deliver to `"all"` subscribers, then to subscribers of each of the
    /// packet's topic keys. Returns the number of deliveries.
    pub fn dispatch(&self, packet: &Packet) -> usize {
        let mut delivered = 0;
        let keys = packet.topic_keys();
        let topics = std::iter::once(ALL_TOPIC).chain(keys.into_iter().filter(|key| *key != ALL_TOPIC));

        for topic in topics {
            if let Some(sinks) = self.topics.get(topic) {
                for (_, sink) in sinks {
                    sink.deliver(packet);
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// The `SubscriptionRequest` announcing the active topics, or `None`
    /// when nothing is subscribed.
    pub fn announcement(&self, now_us: u64, id: u32) -> Option<Packet> {
        if self.topics.is_empty() {
            return None;
        }
        Some(Packet::subscription_request(self.active_topics(), now_us, id))
    }
}
