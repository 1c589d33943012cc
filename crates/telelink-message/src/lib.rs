//! Packet envelope and the message set exchanged with a device node.
//!
//! Encoding is closed over the known variants; decoding tolerates messages
//! this build does not know and keeps them as raw maps so they can be routed
//! by key and re-encoded unchanged.

pub mod data;
pub mod error;
pub mod packet;
pub mod variants;

pub use ciborium::Value;
pub use data::{PacketData, ALL_TOPIC};
pub use error::{MessageError, Result};
pub use packet::{NodeId, Packet};
pub use variants::{
    DiagnosticKeyValue, DiagnosticMsg, DiagnosticStatus, MotionMode, MotionTargetRequest,
    OdometryDelta, PositionEstimate, SubscriptionRequest,
};
