//! Message bodies carried in [`PacketData`](crate::PacketData).
//!
//! Field order matches the order the remote node serializes and expects.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MessageError, Result};

/// Wheel-odometry increment between two timestamps (µs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryDelta {
    pub start_time: u64,
    pub end_time: u64,
    pub delta_position: [f32; 2],
    pub delta_orientation: f32,
}

/// Severity of a [`DiagnosticMsg`].
///
/// Written as its integer code. Decoding accepts either the code or the
/// variant name, since nodes built from the same schema with derived serde
/// impls send the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticStatus {
    Ok = 0,
    Warn = 1,
    Error = 2,
    Stale = 3,
}

impl DiagnosticStatus {
    /// Integer code used on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Warn),
            2 => Ok(Self::Error),
            3 => Ok(Self::Stale),
            other => Err(MessageError::UnknownLevel(other.to_string())),
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "Ok" => Ok(Self::Ok),
            "Warn" => Ok(Self::Warn),
            "Error" => Ok(Self::Error),
            "Stale" => Ok(Self::Stale),
            other => Err(MessageError::UnknownLevel(other.to_string())),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::Warn => "Warn",
            Self::Error => "Error",
            Self::Stale => "Stale",
        }
    }
}

impl fmt::Display for DiagnosticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for DiagnosticStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for DiagnosticStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct LevelVisitor;

        impl Visitor<'_> for LevelVisitor {
            type Value = DiagnosticStatus;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a diagnostic level code (0-3) or name")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                DiagnosticStatus::from_code(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                match u64::try_from(v) {
                    Ok(code) => self.visit_u64(code),
                    Err(_) => Err(E::custom(MessageError::UnknownLevel(v.to_string()))),
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                DiagnosticStatus::from_name(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(LevelVisitor)
    }
}

/// One key/value pair of a diagnostic report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticKeyValue {
    pub key: String,
    pub value: String,
}

/// Diagnostic report from a named component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticMsg {
    pub level: DiagnosticStatus,
    pub name: String,
    pub message: String,
    pub values: Vec<DiagnosticKeyValue>,
}

/// Topics the sender wants delivered to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub timestamp: u64,
    pub position: [f32; 2],
    pub orientation: f32,
}

/// Motion control mode, written as its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionMode {
    Position,
    Velocity,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionTargetRequest {
    pub linear: [f32; 2],
    pub angular: f32,
    pub motion_mode: MotionMode,
}
