//! Reconnecting device connection with topic-based subscriptions.
//!
//! This is the "just works" layer. Connect to a device node, register
//! interest in message topics, and send packets. Reconnection, periodic
//! subscription announcements and frame recovery happen in the background.

pub mod config;
pub mod connection;
pub mod error;
pub mod inbound;
pub mod state;
pub mod subscription;

pub use config::{
    ConnectionConfig, DEFAULT_FLUSH_TIMEOUT, DEFAULT_PORT, DEFAULT_RECONNECT_DELAY,
    DEFAULT_SUBSCRIPTION_REFRESH,
};
pub use connection::{now_micros, Connection, Subscription};
pub use error::{PeerError, Result};
pub use inbound::{DeliveryPolicy, InboundPipeline, InboundStats};
pub use state::{transition, ConnectionStatus, Effect, LinkEvent, LinkState};
pub use subscription::{PacketStream, Removal, Sink, SubscriptionId, SubscriptionTable};
