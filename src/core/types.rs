//! Data carried through the pipeline: joint rows, windows, feature vectors,
//! classification events and the tag vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Scalars per joint row: right{acc, gyro, quat} then left{acc, gyro, quat}.
pub const ROW_WIDTH: usize = 20;

/// Length of the extractor's output and the classifier's input.
pub const FEATURE_COUNT: usize = 18;

/// Accelerometers report milli-g; the extractor expects g.
const MILLI_G_PER_G: f32 = 1000.0;

/// One wrist's complete sample triplet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WristTriplet {
    pub acc: [f64; 3],
    pub gyro: [f64; 3],
    pub quat: [f64; 4],
}

impl WristTriplet {
    fn write_into(&self, out: &mut [f64]) {
        out[0..3].copy_from_slice(&self.acc);
        out[3..6].copy_from_slice(&self.gyro);
        out[6..10].copy_from_slice(&self.quat);
    }

    fn read_from(values: &[f64]) -> Self {
        Self {
            acc: [values[0], values[1], values[2]],
            gyro: [values[3], values[4], values[5]],
            quat: [values[6], values[7], values[8], values[9]],
        }
    }
}

/// Both wrists aligned at one instant. Built only by the synchronizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointRow {
    values: [f64; ROW_WIDTH],
    emit_ts: f64,
}

impl JointRow {
    pub fn new(right: &WristTriplet, left: &WristTriplet, emit_ts: f64) -> Self {
        let mut values = [0.0; ROW_WIDTH];
        right.write_into(&mut values[0..10]);
        left.write_into(&mut values[10..20]);
        Self { values, emit_ts }
    }

    pub fn values(&self) -> &[f64; ROW_WIDTH] {
        &self.values
    }

    pub fn emit_ts(&self) -> f64 {
        self.emit_ts
    }

    pub fn right(&self) -> WristTriplet {
        WristTriplet::read_from(&self.values[0..10])
    }

    pub fn left(&self) -> WristTriplet {
        WristTriplet::read_from(&self.values[10..20])
    }
}

/// Exactly `window_size` consecutive rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    rows: Vec<JointRow>,
}

impl Window {
    pub(crate) fn from_rows(rows: Vec<JointRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[JointRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Timestamp of the last row.
    pub fn end_ts(&self) -> f64 {
        self.rows.last().map(JointRow::emit_ts).unwrap_or(0.0)
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.rows.iter().map(JointRow::emit_ts).collect()
    }

    /// Split into per-channel f32 arrays, acceleration converted to g.
    pub fn channels(&self) -> WindowChannels {
        WindowChannels {
            right: WristChannels::collect(&self.rows, 0),
            left: WristChannels::collect(&self.rows, 10),
        }
    }
}

/// Ten per-channel arrays for one wrist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WristChannels {
    pub acc_x: Vec<f32>,
    pub acc_y: Vec<f32>,
    pub acc_z: Vec<f32>,
    pub gyro_x: Vec<f32>,
    pub gyro_y: Vec<f32>,
    pub gyro_z: Vec<f32>,
    pub quat_x: Vec<f32>,
    pub quat_y: Vec<f32>,
    pub quat_z: Vec<f32>,
    pub quat_w: Vec<f32>,
}

impl WristChannels {
    fn collect(rows: &[JointRow], offset: usize) -> Self {
        let column = |i: usize| -> Vec<f32> {
            rows.iter().map(|r| r.values[offset + i] as f32).collect()
        };
        let acc = |i: usize| -> Vec<f32> {
            column(i).into_iter().map(|v| v / MILLI_G_PER_G).collect()
        };

        Self {
            acc_x: acc(0),
            acc_y: acc(1),
            acc_z: acc(2),
            gyro_x: column(3),
            gyro_y: column(4),
            gyro_z: column(5),
            // The extractor rescales quaternions itself.
            quat_x: column(6),
            quat_y: column(7),
            quat_z: column(8),
            quat_w: column(9),
        }
    }
}

/// The 20 channel arrays handed to the feature extractor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowChannels {
    pub right: WristChannels,
    pub left: WristChannels,
}

impl WindowChannels {
    /// Channels in the native routine's argument order: right acc and gyro,
    /// left acc and gyro, right quaternion, left quaternion.
    pub fn native_order(&self) -> [&[f32]; ROW_WIDTH] {
        let (r, l) = (&self.right, &self.left);
        [
            r.acc_x.as_slice(),
            r.acc_y.as_slice(),
            r.acc_z.as_slice(),
            r.gyro_x.as_slice(),
            r.gyro_y.as_slice(),
            r.gyro_z.as_slice(),
            l.acc_x.as_slice(),
            l.acc_y.as_slice(),
            l.acc_z.as_slice(),
            l.gyro_x.as_slice(),
            l.gyro_y.as_slice(),
            l.gyro_z.as_slice(),
            r.quat_x.as_slice(),
            r.quat_y.as_slice(),
            r.quat_z.as_slice(),
            r.quat_w.as_slice(),
            l.quat_x.as_slice(),
            l.quat_y.as_slice(),
            l.quat_z.as_slice(),
            l.quat_w.as_slice(),
        ]
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.right.acc_x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("feature vector has {actual} values, expected {expected}")]
pub struct FeatureShapeError {
    pub expected: usize,
    pub actual: usize,
}

/// Extractor output for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Confirm the vector has exactly [`FEATURE_COUNT`] values.
    pub fn check_shape(&self) -> Result<(), FeatureShapeError> {
        if self.0.len() == FEATURE_COUNT {
            Ok(())
        } else {
            Err(FeatureShapeError {
                expected: FEATURE_COUNT,
                actual: self.0.len(),
            })
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Feedback strength for an active tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Mild,
    Strong,
}

/// Classifier output vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StereotipyTag {
    NoClass,
    NonDangerous,
    Dangerous,
    NonStereotipy,
    /// Any code outside the label table; never actuated
    Unknown(i32),
}

impl StereotipyTag {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => StereotipyTag::NoClass,
            1 => StereotipyTag::NonDangerous,
            2 => StereotipyTag::Dangerous,
            3 => StereotipyTag::NonStereotipy,
            other => StereotipyTag::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            StereotipyTag::NoClass => 0,
            StereotipyTag::NonDangerous => 1,
            StereotipyTag::Dangerous => 2,
            StereotipyTag::NonStereotipy => 3,
            StereotipyTag::Unknown(code) => code,
        }
    }

    /// Whether this tag calls for feedback.
    pub fn is_active(self) -> bool {
        matches!(self, StereotipyTag::NonDangerous | StereotipyTag::Dangerous)
    }

    pub fn severity(self) -> Option<Severity> {
        match self {
            StereotipyTag::NonDangerous => Some(Severity::Mild),
            StereotipyTag::Dangerous => Some(Severity::Strong),
            _ => None,
        }
    }

    pub fn label(self) -> String {
        match self {
            StereotipyTag::NoClass => "NO_CLASS".to_string(),
            StereotipyTag::NonDangerous => "NON_DANGEROUS".to_string(),
            StereotipyTag::Dangerous => "DANGEROUS".to_string(),
            StereotipyTag::NonStereotipy => "NON_STEREOTIPY".to_string(),
            StereotipyTag::Unknown(code) => code.to_string(),
        }
    }
}

impl fmt::Display for StereotipyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One classified window, as published on the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEvent {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Timestamp of the window's last row
    pub window_ts: f64,
    /// Actuation must be suppressed (calibration not finished)
    pub gated: bool,
    pub source: String,
    pub features: FeatureVector,
    /// Raw classifier output
    pub tag: i32,
}

impl ClassificationEvent {
    pub fn new(features: FeatureVector, window_ts: f64, gated: bool, source: &str, tag: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            window_ts,
            gated,
            source: source.to_string(),
            features,
            tag,
        }
    }

    pub fn stereotipy_tag(&self) -> StereotipyTag {
        StereotipyTag::from_code(self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn triplet(base: f64) -> WristTriplet {
        WristTriplet {
            acc: [base, base + 1.0, base + 2.0],
            gyro: [base + 3.0, base + 4.0, base + 5.0],
            quat: [base + 6.0, base + 7.0, base + 8.0, base + 9.0],
        }
    }

    #[test]
    fn test_joint_row_orders_right_then_left() {
        let row = JointRow::new(&triplet(100.0), &triplet(200.0), 1.5);

        assert_eq!(row.values()[0], 100.0);
        assert_eq!(row.values()[9], 109.0);
        assert_eq!(row.values()[10], 200.0);
        assert_eq!(row.values()[19], 209.0);
        assert_eq!(row.right(), triplet(100.0));
        assert_eq!(row.left(), triplet(200.0));
        assert_eq!(row.emit_ts(), 1.5);
    }

    #[test]
    fn test_channels_scale_acceleration_only() {
        let rows = vec![
            JointRow::new(&triplet(1000.0), &triplet(2000.0), 0.0),
            JointRow::new(&triplet(3000.0), &triplet(4000.0), 0.1),
        ];
        let channels = Window::from_rows(rows).channels();

        assert_eq!(channels.len(), 2);
        assert_eq!(channels.right.acc_x, vec![1.0, 3.0]);
        assert_eq!(channels.left.acc_z, vec![2.002, 4.002]);
        assert_eq!(channels.right.gyro_x, vec![1003.0, 3003.0]);
        assert_eq!(channels.left.quat_w, vec![2009.0, 4009.0]);
    }

    #[test]
    fn test_native_order_layout() {
        let rows = vec![JointRow::new(&triplet(0.0), &triplet(1000.0), 0.0)];
        let channels = Window::from_rows(rows).channels();
        let order = channels.native_order();

        // right acc_x, left acc_x, right quat_x, left quat_w
        assert_eq!(order[0], &[0.0][..]);
        assert_eq!(order[6], &[1.0][..]);
        assert_eq!(order[12], &[6.0][..]);
        assert_eq!(order[19], &[1009.0][..]);
    }

    #[test]
    fn test_feature_shape_check() {
        assert!(FeatureVector::new(vec![0.0; FEATURE_COUNT]).check_shape().is_ok());
        assert_eq!(
            FeatureVector::new(vec![0.0; 5]).check_shape(),
            Err(FeatureShapeError {
                expected: 18,
                actual: 5
            })
        );
    }

    #[test]
    fn test_tag_vocabulary() {
        assert_eq!(StereotipyTag::from_code(0), StereotipyTag::NoClass);
        assert_eq!(StereotipyTag::from_code(2), StereotipyTag::Dangerous);
        assert_eq!(StereotipyTag::from_code(9), StereotipyTag::Unknown(9));
        assert!(StereotipyTag::NonDangerous.is_active());
        assert!(!StereotipyTag::NonStereotipy.is_active());
        assert_eq!(StereotipyTag::Dangerous.severity(), Some(Severity::Strong));
        assert_eq!(StereotipyTag::NonStereotipy.label(), "NON_STEREOTIPY");
        assert_eq!(StereotipyTag::Unknown(-1).code(), -1);
    }
}
