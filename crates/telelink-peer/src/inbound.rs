use telelink_frame::{FrameFinder, PacketCodec};
use telelink_message::Packet;
use tracing::{trace, warn};

/// Which of the packets decoded from one socket read are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Every decoded packet, in arrival order.
    #[default]
    EveryFrame,
    /// Only the last packet decoded from each read.
    LatestOnly,
}

/// Running totals for an [`InboundPipeline`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundStats {
    pub decoded: u64,
    pub dropped: u64,
    pub superseded: u64,
}

/// Raw socket chunks in, packets out.
///
/// Frames that fail to un-stuff, checksum or decode are logged and dropped;
/// they never affect the frames around them.
#[derive(Debug)]
pub struct InboundPipeline {
    finder: FrameFinder,
    codec: PacketCodec,
    policy: DeliveryPolicy,
    stats: InboundStats,
}

impl InboundPipeline {
    pub fn new(policy: DeliveryPolicy, max_frame_size: usize) -> Self {
        Self {
            finder: FrameFinder::with_max_frame_size(max_frame_size),
            codec: PacketCodec::new(),
            policy,
            stats: InboundStats::default(),
        }
    }

    /// Feed one read's worth of bytes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Packet> {
        let mut decoded = Vec::new();
        for frame in self.finder.push_bytes(chunk) {
            if frame.is_empty() {
                continue;
            }
            match self.codec.decode::<Packet>(&frame) {
                Ok(packet) => {
                    trace!(id = packet.id, len = frame.len(), "decoded packet");
                    self.stats.decoded += 1;
                    decoded.push(packet);
                }
                Err(err) => {
                    warn!(error = %err, len = frame.len(), "dropping undecodable frame");
                    self.stats.dropped += 1;
                }
            }
        }

        if self.policy == DeliveryPolicy::LatestOnly && decoded.len() > 1 {
            let superseded = decoded.len() - 1;
            self.stats.superseded += superseded as u64;
            decoded.drain(..superseded);
        }
        decoded
    }

    /// Forget any partial frame, e.g. when a new socket is opened.
    pub fn reset(&mut self) {
        self.finder.reset();
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    pub fn stats(&self) -> InboundStats {
        self.stats
    }
}
