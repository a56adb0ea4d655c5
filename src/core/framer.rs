//! Sliding-window framing with warm-up and one-time calibration.
//!
//! Joint rows accumulate in a buffer. Each time the buffer holds a full
//! window, the last `window_size` rows are framed and `hop_size` rows slide
//! out. The first `calibration_windows` windows are discarded while the
//! wearer settles; the next one calibrates the extractor.

use crate::config::BufferConfig;
use crate::core::native::FeatureExtractor;
use crate::core::synchronizer::RowSink;
use crate::core::types::{FeatureVector, JointRow, Window};
use crate::transparency::SharedTransparencyLog;
use std::sync::{Arc, Mutex};

/// Receives the extractor output for each processed window.
pub trait FeatureSink: Send + Sync {
    fn on_features(&self, features: FeatureVector, window_ts: f64, gated: bool);
}

struct Processor {
    warmup_left: u32,
    calibrated: bool,
    windows_seen: u64,
    extractor: Box<dyn FeatureExtractor>,
}

pub struct WindowFramer {
    window_size: usize,
    hop_size: i64,
    gate_during_calibration: bool,
    rows: Mutex<Vec<JointRow>>,
    processor: Mutex<Processor>,
    sink: Arc<dyn FeatureSink>,
    log: SharedTransparencyLog,
}

impl WindowFramer {
    pub fn new(
        config: &BufferConfig,
        extractor: Box<dyn FeatureExtractor>,
        sink: Arc<dyn FeatureSink>,
        log: SharedTransparencyLog,
    ) -> Self {
        let window_size = config.window_size.max(1);
        tracing::info!(
            window_size,
            hop_size = config.hop_size,
            calibration_windows = config.calibration_windows,
            gate = config.gate_actuation_during_calibration,
            "Window framer ready"
        );

        Self {
            window_size,
            hop_size: config.hop_size,
            gate_during_calibration: config.gate_actuation_during_calibration,
            rows: Mutex::new(Vec::with_capacity(window_size * 2)),
            processor: Mutex::new(Processor {
                warmup_left: config.calibration_windows,
                calibrated: false,
                windows_seen: 0,
                extractor,
            }),
            sink,
            log,
        }
    }

    /// Append a row; frames and processes a window when the buffer is full.
    ///
    /// The processor lock is taken before the row lock is released, so windows
    /// reach the extractor in the order they were framed.
    pub fn add_row(&self, row: JointRow) {
        let (window, mut processor) = {
            let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
            rows.push(row);
            if rows.len() < self.window_size {
                return;
            }

            let start = rows.len() - self.window_size;
            let window = Window::from_rows(rows[start..].to_vec());

            if self.hop_size <= 0 {
                rows.clear();
            } else {
                let hop = (self.hop_size as usize).min(rows.len());
                rows.drain(..hop);
            }
            (window, self.processor.lock().unwrap_or_else(|e| e.into_inner()))
        };

        let processed = self.process(&mut processor, &window);
        drop(processor);

        if let Some((features, window_ts, gated)) = processed {
            self.sink.on_features(features, window_ts, gated);
        }
    }

    fn process(
        &self,
        processor: &mut Processor,
        window: &Window,
    ) -> Option<(FeatureVector, f64, bool)> {
        processor.windows_seen += 1;

        if processor.warmup_left > 0 {
            processor.warmup_left -= 1;
            tracing::debug!(remaining = processor.warmup_left, "Discarding warm-up window");
            self.log.record_warmup_window();
            return None;
        }

        let calibrate = !processor.calibrated;
        let gated = self.gate_during_calibration && !processor.calibrated;

        match processor.extractor.extract(&window.channels(), calibrate) {
            Ok(features) => {
                if calibrate {
                    tracing::info!("Calibration window processed");
                    processor.calibrated = true;
                }
                self.log.record_window_processed();
                Some((features, window.end_ts(), gated))
            }
            Err(e) => {
                tracing::warn!(error = %e, calibrate, "Feature extraction failed, dropping window");
                self.log.record_extractor_failure();
                None
            }
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.processor.lock().unwrap_or_else(|e| e.into_inner()).calibrated
    }

    /// Whether windows framed now would be gated.
    pub fn should_gate_actuation(&self) -> bool {
        self.gate_during_calibration && !self.is_calibrated()
    }

    /// Windows framed so far, warm-up included.
    pub fn windows_seen(&self) -> u64 {
        self.processor.lock().unwrap_or_else(|e| e.into_inner()).windows_seen
    }

    /// Rows currently buffered.
    pub fn buffered(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl RowSink for WindowFramer {
    fn on_row(&self, row: JointRow) {
        self.add_row(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::native::NativeError;
    use crate::core::types::{WindowChannels, WristTriplet, FEATURE_COUNT};
    use crate::transparency::create_shared_log;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeExtractor {
        calls: Arc<Mutex<Vec<(usize, bool)>>>,
        fail_next: Arc<AtomicU32>,
    }

    impl FeatureExtractor for FakeExtractor {
        fn extract(
            &mut self,
            channels: &WindowChannels,
            calibrate: bool,
        ) -> Result<FeatureVector, NativeError> {
            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(NativeError::Failed("boom".to_string()));
            }
            self.calls.lock().unwrap().push((channels.len(), calibrate));
            Ok(FeatureVector::new(vec![0.0; FEATURE_COUNT]))
        }
    }

    #[derive(Default)]
    struct CollectFeatures(Mutex<Vec<(f64, bool)>>);

    impl FeatureSink for CollectFeatures {
        fn on_features(&self, _features: FeatureVector, window_ts: f64, gated: bool) {
            self.0.lock().unwrap().push((window_ts, gated));
        }
    }

    struct Harness {
        framer: WindowFramer,
        sink: Arc<CollectFeatures>,
        calls: Arc<Mutex<Vec<(usize, bool)>>>,
        fail_next: Arc<AtomicU32>,
    }

    fn harness(window_size: usize, hop_size: i64, calibration_windows: u32) -> Harness {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fail_next = Arc::new(AtomicU32::new(0));
        let sink = Arc::new(CollectFeatures::default());
        let config = BufferConfig {
            window_size,
            hop_size,
            calibration_windows,
            gate_actuation_during_calibration: true,
        };
        let framer = WindowFramer::new(
            &config,
            Box::new(FakeExtractor {
                calls: calls.clone(),
                fail_next: fail_next.clone(),
            }),
            sink.clone(),
            create_shared_log(),
        );
        Harness {
            framer,
            sink,
            calls,
            fail_next,
        }
    }

    fn row(ts: f64) -> JointRow {
        let t = WristTriplet {
            acc: [0.0, 0.0, 1000.0],
            gyro: [0.0; 3],
            quat: [0.0, 0.0, 0.0, 1.0],
        };
        JointRow::new(&t, &t, ts)
    }

    #[test]
    fn test_window_count_follows_hop_arithmetic() {
        for rows in [0usize, 149, 150, 224, 225, 300, 1000] {
            let h = harness(150, 75, 0);
            for i in 0..rows {
                h.framer.add_row(row(i as f64));
            }

            let expected = if rows < 150 { 0 } else { (rows - 150) / 75 + 1 };
            assert_eq!(h.framer.windows_seen() as usize, expected, "rows = {rows}");
            assert_eq!(h.sink.0.lock().unwrap().len(), expected);
        }
    }

    #[test]
    fn test_window_ends_at_newest_row() {
        let h = harness(4, 2, 0);
        for i in 0..6 {
            h.framer.add_row(row(i as f64));
        }

        let emitted = h.sink.0.lock().unwrap().clone();
        assert_eq!(emitted.iter().map(|(ts, _)| *ts).collect::<Vec<_>>(), vec![3.0, 5.0]);
        assert!(h.calls.lock().unwrap().iter().all(|(len, _)| *len == 4));
    }

    #[test]
    fn test_non_positive_hop_clears_buffer() {
        let h = harness(3, 0, 0);
        for i in 0..9 {
            h.framer.add_row(row(i as f64));
        }
        assert_eq!(h.framer.windows_seen(), 3);
        assert_eq!(h.framer.buffered(), 0);
    }

    #[test]
    fn test_calibration_gating() {
        let h = harness(2, 2, 2);
        for i in 0..8 {
            h.framer.add_row(row(i as f64));
        }

        // Windows 1-2 are warm-up; window 3 calibrates and is gated.
        assert_eq!(h.framer.windows_seen(), 4);
        assert_eq!(*h.sink.0.lock().unwrap(), vec![(5.0, true), (7.0, false)]);
        assert_eq!(*h.calls.lock().unwrap(), vec![(2, true), (2, false)]);
        assert!(h.framer.is_calibrated());
        assert!(!h.framer.should_gate_actuation());
    }

    #[test]
    fn test_failed_calibration_is_retried() {
        let h = harness(2, 2, 0);
        h.fail_next.store(1, Ordering::SeqCst);

        for i in 0..4 {
            h.framer.add_row(row(i as f64));
        }

        assert_eq!(*h.calls.lock().unwrap(), vec![(2, true)]);
        assert_eq!(*h.sink.0.lock().unwrap(), vec![(3.0, true)]);
        assert!(h.framer.is_calibrated());
    }

    #[test]
    fn test_concurrent_listeners_calibrate_on_first_extraction() {
        let h = Arc::new(harness(2, 2, 1));

        let workers: Vec<_> = (0..4)
            .map(|t| {
                let h = h.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        h.framer.add_row(row((t * 1000 + i) as f64));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(h.framer.windows_seen(), 400);
        let calls = h.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 399);
        assert_eq!(calls[0], (2, true));
        assert_eq!(calls.iter().filter(|(_, calibrate)| *calibrate).count(), 1);
    }
}
