use std::fmt;

use ciborium::Value;
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MessageError;
use crate::variants::{
    DiagnosticMsg, MotionTargetRequest, OdometryDelta, PositionEstimate, SubscriptionRequest,
};

/// Wildcard topic: subscribers under it receive every packet.
pub const ALL_TOPIC: &str = "all";

macro_rules! packet_variants {
    ($($variant:ident),* $(,)?) => {
        /// Message body of a [`Packet`](crate::Packet).
        ///
        /// On the wire this is a map with a single key naming the variant,
        /// e.g. `{"OdometryDelta": {...}}`. Maps that do not name a known
        /// variant decode to [`PacketData::Unknown`] and re-encode unchanged.
        #[derive(Debug, Clone, PartialEq)]
        pub enum PacketData {
            $($variant($variant),)*
            /// Unrecognized message, kept as the raw decoded map.
            Unknown(Value),
        }

        impl PacketData {
            /// Variant names this build understands.
            pub const KNOWN_TAGS: &'static [&'static str] = &[$(stringify!($variant)),*];

            /// Variant name for known messages, `None` for [`PacketData::Unknown`].
            pub fn tag(&self) -> Option<&'static str> {
                match self {
                    $(Self::$variant(_) => Some(stringify!($variant)),)*
                    Self::Unknown(_) => None,
                }
            }
        }

        $(
            impl From<$variant> for PacketData {
                fn from(body: $variant) -> Self {
                    Self::$variant(body)
                }
            }
        )*

        impl Serialize for PacketData {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self {
                    $(
                        Self::$variant(body) => {
                            let mut map = serializer.serialize_map(Some(1))?;
                            map.serialize_entry(stringify!($variant), body)?;
                            map.end()
                        }
                    )*
                    Self::Unknown(raw) => raw.serialize(serializer),
                }
            }
        }

        struct DataVisitor;

        impl<'de> Visitor<'de> for DataVisitor {
            type Value = PacketData;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map keyed by message type")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<PacketData, A::Error> {
                let Some(key) = map.next_key::<Value>()? else {
                    return Ok(PacketData::Unknown(Value::Map(Vec::new())));
                };

                if let Value::Text(tag) = &key {
                    match tag.as_str() {
                        $(
                            stringify!($variant) => {
                                let body = map.next_value::<$variant>()?;
                                expect_no_more_keys(&mut map, stringify!($variant))?;
                                return Ok(PacketData::$variant(body));
                            }
                        )*
                        _ => {}
                    }
                }

                let mut entries = vec![(key, map.next_value::<Value>()?)];
                while let Some(entry) = map.next_entry::<Value, Value>()? {
                    entries.push(entry);
                }
                Ok(PacketData::Unknown(Value::Map(entries)))
            }
        }
    };
}

packet_variants!(
    OdometryDelta,
    DiagnosticMsg,
    SubscriptionRequest,
    PositionEstimate,
    MotionTargetRequest,
);

fn expect_no_more_keys<'de, A: MapAccess<'de>>(map: &mut A, tag: &'static str) -> Result<(), A::Error> {
    let mut extra = 0usize;
    while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {
        extra += 1;
    }
    if extra > 0 {
        return Err(de::Error::custom(MessageError::ExtraKeys { tag, extra }));
    }
    Ok(())
}

impl<'de> Deserialize<'de> for PacketData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DataVisitor)
    }
}

impl PacketData {
    /// Keys a subscriber can match this message on.
    ///
    /// Known messages have exactly their tag; unknown maps expose every text
    /// key they carry.
    pub fn topic_keys(&self) -> Vec<&str> {
        match self {
            Self::Unknown(Value::Map(entries)) => entries
                .iter()
                .filter_map(|(key, _)| match key {
                    Value::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            Self::Unknown(_) => Vec::new(),
            known => known.tag().into_iter().collect(),
        }
    }

    pub fn is_known(&self) -> bool {
        self.tag().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::{DiagnosticKeyValue, DiagnosticStatus, MotionMode};

    fn to_cbor<T: Serialize>(value: &T) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out).unwrap();
        out
    }

    fn from_cbor(bytes: &[u8]) -> Result<PacketData, String> {
        ciborium::from_reader(bytes).map_err(|err| format!("{err:?}"))
    }

    fn samples() -> Vec<PacketData> {
        vec![
            OdometryDelta {
                start_time: 1_768_100_626_490_194,
                end_time: 1_768_100_626_590_193,
                delta_position: [0.25, -1.5],
                delta_orientation: 0.125,
            }
            .into(),
            DiagnosticMsg {
                level: DiagnosticStatus::Warn,
                name: "left_motor".to_string(),
                message: "current high".to_string(),
                values: vec![DiagnosticKeyValue {
                    key: "amps".to_string(),
                    value: "4.2".to_string(),
                }],
            }
            .into(),
            SubscriptionRequest {
                topics: vec!["all".to_string(), "OdometryDelta".to_string()],
            }
            .into(),
            PositionEstimate {
                timestamp: u64::MAX,
                position: [3.0, 4.0],
                orientation: -0.5,
            }
            .into(),
            MotionTargetRequest {
                linear: [0.5, 0.0],
                angular: 1.0,
                motion_mode: MotionMode::Velocity,
            }
            .into(),
        ]
    }

    #[test]
    fn known_variants_roundtrip() {
        for data in samples() {
            let decoded = from_cbor(&to_cbor(&data)).unwrap();
            assert_eq!(decoded, data);
            assert!(decoded.is_known());
        }
    }

    #[test]
    fn known_variant_is_single_key_map() {
        let data: PacketData = SubscriptionRequest {
            topics: vec!["all".to_string()],
        }
        .into();
        let raw: Value = ciborium::from_reader(to_cbor(&data).as_slice()).unwrap();
        let Value::Map(entries) = raw else {
            panic!("expected a map");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, Value::Text("SubscriptionRequest".to_string()));
    }

    #[test]
    fn unknown_variant_passes_through() {
        let raw = Value::Map(vec![(
            Value::Text("BatteryState".to_string()),
            Value::Map(vec![(Value::Text("volts".to_string()), Value::Float(12.5))]),
        )]);
        let bytes = to_cbor(&raw);

        let decoded = from_cbor(&bytes).unwrap();
        assert_eq!(decoded, PacketData::Unknown(raw));
        assert_eq!(decoded.tag(), None);
        assert_eq!(decoded.topic_keys(), vec!["BatteryState"]);
        assert_eq!(to_cbor(&decoded), bytes);
    }

    #[test]
    fn unknown_map_with_several_keys_exposes_all() {
        let raw = Value::Map(vec![
            (Value::Text("Alpha".to_string()), Value::Null),
            (Value::Integer(7.into()), Value::Null),
            (Value::Text("OdometryDelta".to_string()), Value::Null),
        ]);
        let decoded = from_cbor(&to_cbor(&raw)).unwrap();
        assert_eq!(decoded.topic_keys(), vec!["Alpha", "OdometryDelta"]);
    }

    #[test]
    fn empty_map_is_unknown() {
        let decoded = from_cbor(&to_cbor(&Value::Map(Vec::new()))).unwrap();
        assert_eq!(decoded, PacketData::Unknown(Value::Map(Vec::new())));
        assert!(decoded.topic_keys().is_empty());
    }

    #[test]
    fn known_tag_with_bad_body_is_an_error() {
        let raw = Value::Map(vec![(
            Value::Text("OdometryDelta".to_string()),
            Value::Text("not a body".to_string()),
        )]);
        assert!(from_cbor(&to_cbor(&raw)).is_err());
    }

    #[test]
    fn known_tag_with_extra_keys_is_an_error() {
        let body = SubscriptionRequest {
            topics: vec!["all".to_string()],
        };
        let raw = Value::Map(vec![
            (
                Value::Text("SubscriptionRequest".to_string()),
                Value::serialized(&body).unwrap(),
            ),
            (Value::Text("Extra".to_string()), Value::Bool(true)),
        ]);
        let err = from_cbor(&to_cbor(&raw)).unwrap_err();
        assert!(err.to_string().contains("extra top-level key"), "{err}");
    }

    #[test]
    fn non_map_is_an_error() {
        assert!(from_cbor(&to_cbor(&42u32)).is_err());
        assert!(from_cbor(&to_cbor(&"OdometryDelta")).is_err());
    }

    #[test]
    fn json_shape_matches_wire_shape() {
        let data: PacketData = MotionTargetRequest {
            linear: [1.0, 0.0],
            angular: 0.0,
            motion_mode: MotionMode::Stop,
        }
        .into();
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "MotionTargetRequest": {
                    "linear": [1.0, 0.0],
                    "angular": 0.0,
                    "motion_mode": "Stop"
                }
            })
        );
        let back: PacketData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn json_integers_fill_float_fields() {
        let data: PacketData = serde_json::from_str(
            r#"{"PositionEstimate": {"timestamp": 5, "position": [1, 2], "orientation": 0}}"#,
        )
        .unwrap();
        assert_eq!(
            data,
            PacketData::PositionEstimate(PositionEstimate {
                timestamp: 5,
                position: [1.0, 2.0],
                orientation: 0.0,
            })
        );
    }
}
