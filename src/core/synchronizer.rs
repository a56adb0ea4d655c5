//! Time alignment of the two wrist streams.
//!
//! Each wrist sensor reports acceleration, angular rate and orientation on its
//! own clock and at its own pace. The synchronizer keeps the latest triplet per
//! wrist and emits a [`JointRow`] when both triplets are complete and their
//! newest timestamps are within the skew tolerance.

use crate::clock::SharedClock;
use crate::config::{DevicePairConfig, SyncConfig};
use crate::core::types::{JointRow, WristTriplet};
use crate::device::{ImuSample, SampleKind, WristSide};
use crate::transparency::SharedTransparencyLog;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Receives joint rows as the synchronizer emits them.
pub trait RowSink: Send + Sync {
    fn on_row(&self, row: JointRow);
}

/// Latest readings of one wrist, each with its arrival time.
#[derive(Debug, Clone, Default)]
struct DeviceState {
    acc: Option<([f64; 3], f64)>,
    gyro: Option<([f64; 3], f64)>,
    quat: Option<([f64; 4], f64)>,
}

impl DeviceState {
    fn is_ready(&self) -> bool {
        self.acc.is_some() && self.gyro.is_some() && self.quat.is_some()
    }

    fn is_empty(&self) -> bool {
        self.acc.is_none() && self.gyro.is_none() && self.quat.is_none()
    }

    fn newest_ts(&self) -> f64 {
        [
            self.acc.map(|(_, t)| t),
            self.gyro.map(|(_, t)| t),
            self.quat.map(|(_, t)| t),
        ]
        .into_iter()
        .flatten()
        .fold(f64::NEG_INFINITY, f64::max)
    }

    fn triplet(&self) -> Option<WristTriplet> {
        Some(WristTriplet {
            acc: self.acc?.0,
            gyro: self.gyro?.0,
            quat: self.quat?.0,
        })
    }

    fn store(&mut self, kind: SampleKind, values: &[f64], arrival: f64) {
        match kind {
            SampleKind::Acc => self.acc = Some(([values[0], values[1], values[2]], arrival)),
            SampleKind::Gyro => self.gyro = Some(([values[0], values[1], values[2]], arrival)),
            SampleKind::Quat => {
                self.quat = Some(([values[0], values[1], values[2], values[3]], arrival))
            }
        }
    }

    fn clear(&mut self) {
        *self = DeviceState::default();
    }
}

/// Alignment counters since creation or the last [`Synchronizer::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub emits: u64,
    pub drops_left: u64,
    pub drops_right: u64,
    pub stale_evictions: u64,
}

#[derive(Debug, Default)]
struct SyncState {
    left: DeviceState,
    right: DeviceState,
    stats: SyncStats,
}

/// Merges the left and right wrist streams into joint rows.
pub struct Synchronizer {
    left_id: String,
    right_id: String,
    max_skew: f64,
    /// Zero disables staleness eviction
    stale: f64,
    state: Mutex<SyncState>,
    sink: Arc<dyn RowSink>,
    clock: SharedClock,
    log: SharedTransparencyLog,
}

impl Synchronizer {
    pub fn new(
        devices: &DevicePairConfig,
        sync: &SyncConfig,
        sink: Arc<dyn RowSink>,
        clock: SharedClock,
        log: SharedTransparencyLog,
    ) -> Self {
        tracing::info!(
            left = %devices.left_id,
            right = %devices.right_id,
            max_skew_ms = sync.max_skew_ms,
            stale_ms = sync.stale_ms,
            "Synchronizer ready"
        );

        Self {
            left_id: devices.left_id.clone(),
            right_id: devices.right_id.clone(),
            max_skew: sync.max_skew_secs(),
            stale: sync.stale_secs(),
            state: Mutex::new(SyncState::default()),
            sink,
            clock,
            log,
        }
    }

    /// Which wrist a device id belongs to.
    pub fn side_of(&self, device_id: &str) -> Option<WristSide> {
        if device_id == self.left_id {
            Some(WristSide::Left)
        } else if device_id == self.right_id {
            Some(WristSide::Right)
        } else {
            None
        }
    }

    /// Time source staleness is measured against. Listeners stamp arrivals
    /// with it, or call [`Synchronizer::update_now`].
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn ingest(&self, sample: &ImuSample) {
        self.update(&sample.device_id, sample.kind, &sample.values, sample.arrival);
    }

    /// Record one reading and emit a joint row if both wrists line up.
    ///
    /// `arrival` is in monotonic seconds. Never blocks on downstream work: the
    /// row is handed to the sink after the state lock is released.
    pub fn update(&self, device_id: &str, kind: SampleKind, values: &[f64], arrival: f64) {
        let Some(side) = self.side_of(device_id) else {
            tracing::debug!(device = %device_id, "Ignoring sample from unknown device");
            return;
        };
        self.log.record_sample();

        if values.len() != kind.arity() || values.iter().any(|v| !v.is_finite()) {
            tracing::warn!(
                device = %device_id,
                kind = %kind,
                len = values.len(),
                "Dropping malformed sample"
            );
            self.log.record_malformed_sample();
            return;
        }

        let row = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match side {
                WristSide::Left => state.left.store(kind, values, arrival),
                WristSide::Right => state.right.store(kind, values, arrival),
            }
            self.try_emit(&mut state)
        };

        if let Some(row) = row {
            self.log.record_row_emitted();
            self.sink.on_row(row);
        }
    }

    /// [`Synchronizer::update`] stamped with the synchronizer's own clock.
    pub fn update_now(&self, device_id: &str, kind: SampleKind, values: &[f64]) {
        self.update(device_id, kind, values, self.clock.now());
    }

    fn try_emit(&self, state: &mut SyncState) -> Option<JointRow> {
        if self.stale > 0.0 {
            let now = self.clock.now();
            let SyncState { left, right, stats } = &mut *state;
            for (device, side) in [(left, WristSide::Left), (right, WristSide::Right)] {
                if !device.is_empty() && now - device.newest_ts() > self.stale {
                    tracing::debug!(side = ?side, "Evicting stale triplet");
                    device.clear();
                    stats.stale_evictions += 1;
                    self.log.record_stale_eviction();
                }
            }
        }

        if !(state.left.is_ready() && state.right.is_ready()) {
            return None;
        }

        let t_left = state.left.newest_ts();
        let t_right = state.right.newest_ts();

        if (t_left - t_right).abs() <= self.max_skew {
            let right = state.right.triplet()?;
            let left = state.left.triplet()?;
            state.left.clear();
            state.right.clear();
            state.stats.emits += 1;
            return Some(JointRow::new(&right, &left, t_left.max(t_right)));
        }

        // Only the older side goes; the newer one may still pair up.
        if t_left + self.max_skew < t_right {
            state.left.clear();
            state.stats.drops_left += 1;
            self.log.record_alignment_drop(true);
        } else if t_right + self.max_skew < t_left {
            state.right.clear();
            state.stats.drops_right += 1;
            self.log.record_alignment_drop(false);
        }

        None
    }

    pub fn stats(&self) -> SyncStats {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).stats
    }

    /// Clear both triplets and the counters.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = SyncState::default();
    }
}
