//! Sample types pushed by the wrist sensor listeners.
//!
//! A listener forwards each notification it receives from a wrist IMU as one
//! typed sample: which device, which quantity, the raw values and the
//! monotonic arrival time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which quantity a sample carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// Linear acceleration in milli-g (3 values)
    Acc,
    /// Angular rate as reported by the firmware (3 values)
    Gyro,
    /// Orientation quaternion x, y, z, w (4 values)
    Quat,
}

impl SampleKind {
    /// Number of values a well-formed sample of this kind carries.
    pub fn arity(self) -> usize {
        match self {
            SampleKind::Acc | SampleKind::Gyro => 3,
            SampleKind::Quat => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SampleKind::Acc => "acc",
            SampleKind::Gyro => "gyro",
            SampleKind::Quat => "quat",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a sample kind string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sample kind: {0}")]
pub struct UnknownSampleKind(pub String);

impl FromStr for SampleKind {
    type Err = UnknownSampleKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "acc" => Ok(SampleKind::Acc),
            "gyro" | "gyr" => Ok(SampleKind::Gyro),
            "quat" => Ok(SampleKind::Quat),
            other => Err(UnknownSampleKind(other.to_string())),
        }
    }
}

/// Wrist the sensor is strapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WristSide {
    Left,
    Right,
}

impl fmt::Display for WristSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WristSide::Left => f.write_str("left"),
            WristSide::Right => f.write_str("right"),
        }
    }
}

/// One sample as delivered by a feature listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Configured id of the originating device (e.g. `bc_left`)
    pub device_id: String,
    pub kind: SampleKind,
    pub values: Vec<f64>,
    /// Monotonic arrival time in seconds
    pub arrival: f64,
}

impl ImuSample {
    pub fn new(device_id: impl Into<String>, kind: SampleKind, values: Vec<f64>, arrival: f64) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            values,
            arrival,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_kind_parsing() {
        assert_eq!("acc".parse::<SampleKind>(), Ok(SampleKind::Acc));
        assert_eq!("gyr".parse::<SampleKind>(), Ok(SampleKind::Gyro));
        assert_eq!(" GYRO ".parse::<SampleKind>(), Ok(SampleKind::Gyro));
        assert_eq!("quat".parse::<SampleKind>(), Ok(SampleKind::Quat));
        assert!("mag".parse::<SampleKind>().is_err());
    }

    #[test]
    fn test_sample_kind_arity() {
        assert_eq!(SampleKind::Acc.arity(), 3);
        assert_eq!(SampleKind::Gyro.arity(), 3);
        assert_eq!(SampleKind::Quat.arity(), 4);
    }
}
