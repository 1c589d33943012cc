use serde::{Deserialize, Serialize};

use crate::data::PacketData;
use crate::variants::SubscriptionRequest;

/// Address of a node on the link.
pub type NodeId = u16;

/// Envelope around every message on the link.
///
/// Serialized as a map in field order `to, from, data, time, id`; absent
/// node ids are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub to: Option<NodeId>,
    pub from: Option<NodeId>,
    pub data: PacketData,
    /// Microseconds.
    pub time: u64,
    pub id: u32,
}

impl Packet {
    /// Unaddressed packet.
    pub fn new(data: impl Into<PacketData>, time: u64, id: u32) -> Self {
        Self {
            to: None,
            from: None,
            data: data.into(),
            time,
            id,
        }
    }

    pub fn with_to(mut self, to: NodeId) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_from(mut self, from: NodeId) -> Self {
        self.from = Some(from);
        self
    }

    /// Unaddressed `SubscriptionRequest` for `topics`.
    pub fn subscription_request(topics: Vec<String>, time: u64, id: u32) -> Self {
        Self::new(SubscriptionRequest { topics }, time, id)
    }

    /// See [`PacketData::topic_keys`].
    pub fn topic_keys(&self) -> Vec<&str> {
        self.data.topic_keys()
    }
}

#[cfg(test)]
mod tests {
    use ciborium::Value;

    use super::*;
    use crate::variants::{MotionMode, MotionTargetRequest};

    fn to_cbor<T: Serialize>(value: &T) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out).unwrap();
        out
    }

    #[test]
    fn field_order_and_null_addresses() {
        let packet = Packet::subscription_request(vec!["all".to_string()], 10, 2);
        let raw: Value = ciborium::from_reader(to_cbor(&packet).as_slice()).unwrap();
        let Value::Map(entries) = raw else {
            panic!("expected a map");
        };

        let keys: Vec<&str> = entries
            .iter()
            .filter_map(|(key, _)| match key {
                Value::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["to", "from", "data", "time", "id"]);
        assert_eq!(entries[0].1, Value::Null);
        assert_eq!(entries[1].1, Value::Null);
    }

    #[test]
    fn roundtrip_with_addresses_and_large_time() {
        let packet = Packet::new(
            MotionTargetRequest {
                linear: [0.1, 0.2],
                angular: -0.3,
                motion_mode: MotionMode::Position,
            },
            u64::MAX - 1,
            u32::MAX,
        )
        .with_to(3)
        .with_from(NodeId::MAX);

        let decoded: Packet = ciborium::from_reader(to_cbor(&packet).as_slice()).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.topic_keys(), vec!["MotionTargetRequest"]);
    }

    #[test]
    fn json_layout() {
        let packet = Packet::subscription_request(vec!["OdometryDelta".to_string()], 1, 9)
            .with_from(1);
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "to": null,
                "from": 1,
                "data": {"SubscriptionRequest": {"topics": ["OdometryDelta"]}},
                "time": 1,
                "id": 9
            })
        );
    }
}
