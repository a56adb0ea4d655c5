//! Actuator boundary: command types and the manager trait.
//!
//! An actuator id encodes both the actuator kind and its hardware address
//! (`led_192.168.1.40`, `meta_AA:BB:CC:DD:EE:FF`, `speaker_11:22:33:44:55:66`).
//! The activation policy produces [`ActuationParams`] for an id and the
//! dispatcher hands both to an [`ActuatorManager`].

pub mod audio;
pub mod dry_run;
pub mod manager;

use crate::device::DeviceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub use audio::{AudioClip, AudioError, AudioLibrary, Language};
pub use dry_run::DryRunActuators;
pub use manager::SessionActuatorManager;

/// Physical family of an actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    /// Wi-Fi LED strip
    Light,
    /// Wrist-worn vibration motor
    Haptic,
    /// Bluetooth speaker
    Audio,
}

impl ActuatorKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ActuatorKind::Light => "led_",
            ActuatorKind::Haptic => "meta_",
            ActuatorKind::Audio => "speaker_",
        }
    }

    /// Derive the kind from an actuator id, if its prefix is known.
    pub fn from_id(actuator_id: &str) -> Option<Self> {
        [ActuatorKind::Light, ActuatorKind::Haptic, ActuatorKind::Audio]
            .into_iter()
            .find(|kind| actuator_id.starts_with(kind.prefix()))
    }

    /// Build the id for a device of this kind at `address`.
    pub fn actuator_id(self, address: &str) -> String {
        format!("{}{}", self.prefix(), address)
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorKind::Light => f.write_str("light"),
            ActuatorKind::Haptic => f.write_str("haptic"),
            ActuatorKind::Audio => f.write_str("audio"),
        }
    }
}

/// RGBW color, each channel 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgbw(pub u8, pub u8, pub u8, pub u8);

/// Kind-specific parameters for one actuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActuationParams {
    /// Solid color; intensity 0-100, speed 1-100
    Light { color: Rgbw, intensity: u8, speed: u8 },
    /// Built-in animation of the strip controller
    Pattern { pattern: u8, speed: u8, intensity: u8 },
    /// Vibration; duty 0-100, duration in milliseconds
    Haptic { duty: u8, duration: u32 },
    Audio { file: PathBuf },
}

impl ActuationParams {
    /// The actuator family able to execute these parameters.
    pub fn kind(&self) -> ActuatorKind {
        match self {
            ActuationParams::Light { .. } | ActuationParams::Pattern { .. } => ActuatorKind::Light,
            ActuationParams::Haptic { .. } => ActuatorKind::Haptic,
            ActuationParams::Audio { .. } => ActuatorKind::Audio,
        }
    }

    /// Parameters as a JSON map, for audit records.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// A chosen actuator plus what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuationCommand {
    pub actuator_id: String,
    pub params: ActuationParams,
}

/// Errors raised while triggering an actuator.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("unknown actuator: {0}")]
    UnknownActuator(String),

    #[error("actuator {actuator_id} cannot execute {kind} parameters")]
    KindMismatch {
        actuator_id: String,
        kind: ActuatorKind,
    },

    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Executes actuation commands on concrete devices.
pub trait ActuatorManager: Send + Sync {
    /// Ids of the actuators currently registered.
    fn actuator_ids(&self) -> Vec<String>;

    fn trigger(&self, actuator_id: &str, params: &ActuationParams) -> Result<(), ActuatorError>;
}

/// Check that `params` suit the actuator `actuator_id` names.
pub(crate) fn check_kind(actuator_id: &str, params: &ActuationParams) -> Result<(), ActuatorError> {
    match ActuatorKind::from_id(actuator_id) {
        Some(kind) if kind == params.kind() => Ok(()),
        Some(_) => Err(ActuatorError::KindMismatch {
            actuator_id: actuator_id.to_string(),
            kind: params.kind(),
        }),
        None => Err(ActuatorError::UnknownActuator(actuator_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_from_id() {
        assert_eq!(ActuatorKind::from_id("led_192.168.1.40"), Some(ActuatorKind::Light));
        assert_eq!(ActuatorKind::from_id("meta_AA:BB"), Some(ActuatorKind::Haptic));
        assert_eq!(ActuatorKind::from_id("speaker_11:22"), Some(ActuatorKind::Audio));
        assert_eq!(ActuatorKind::from_id("fan_1"), None);
        assert_eq!(ActuatorKind::Haptic.actuator_id("AA:BB"), "meta_AA:BB");
    }

    #[test]
    fn test_params_serialize_flat() {
        let params = ActuationParams::Light {
            color: Rgbw(255, 0, 0, 0),
            intensity: 80,
            speed: 50,
        };
        let map = params.to_map();
        assert_eq!(map["color"], serde_json::json!([255, 0, 0, 0]));
        assert_eq!(map["intensity"], 80);
        assert_eq!(map["speed"], 50);

        let haptic = ActuationParams::Haptic {
            duty: 60,
            duration: 800,
        };
        assert_eq!(serde_json::to_value(&haptic).unwrap(), serde_json::json!({"duty": 60, "duration": 800}));
    }

    #[test]
    fn test_kind_check() {
        let haptic = ActuationParams::Haptic {
            duty: 60,
            duration: 800,
        };
        assert!(check_kind("meta_AA", &haptic).is_ok());
        assert!(matches!(
            check_kind("led_1", &haptic),
            Err(ActuatorError::KindMismatch { .. })
        ));
        assert!(matches!(
            check_kind("fan_1", &haptic),
            Err(ActuatorError::UnknownActuator(_))
        ));
    }
}
