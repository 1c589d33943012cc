//! Framed CBOR telemetry links to robot device nodes.
//!
//! telelink talks to device nodes (motor controllers, sensor boards) over a
//! byte stream: CBOR packets, CRC-16 checksummed, COBS stuffed and delimited
//! by zero bytes.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix socket endpoints
//! - [`frame`]: stuffing, checksums, frame finding and blocking frame I/O
//! - [`message`]: the packet envelope and its message variants
//! - [`peer`]: reconnecting connection with topic subscriptions (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use telelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use telelink_frame::*;
}

/// Re-export message types.
pub mod message {
    pub use telelink_message::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use telelink_peer::*;
}
