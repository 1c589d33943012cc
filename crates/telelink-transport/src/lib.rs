//! Async transport for device links.
//!
//! Provides a unified interface over the transports a device can be
//! reached on:
//! - WebSocket (`ws://host:port/path`), one frame per binary message
//! - TCP (`tcp://host:port` or bare `host:port`)
//! - Unix domain sockets (`unix:///path/to.sock`)
//!
//! This is the lowest layer of telelink. Frames are not message-aware at this
//! level; everything else builds on top of the [`LinkStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod stream;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use stream::{LinkReader, LinkStream, LinkWriter, DEFAULT_CHUNK_SIZE};
