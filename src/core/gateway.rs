//! Classification gateway: feature vector in, event on the channel out.

use crate::core::channel::EventChannel;
use crate::core::framer::FeatureSink;
use crate::core::native::Classifier;
use crate::core::types::{ClassificationEvent, FeatureVector};
use crate::transparency::{AuditActuation, AuditRecord, SharedTransparencyLog};
use std::sync::Arc;

/// Event kind under which motion events are published and counted.
pub const IMU_EVENT_KIND: &str = "imu";

/// Default source identifier for dual-wrist events.
pub const DEFAULT_SOURCE: &str = "dual_wrist";

pub struct ClassificationGateway {
    classifier: Arc<dyn Classifier>,
    channel: EventChannel<ClassificationEvent>,
    source: String,
    log: SharedTransparencyLog,
}

impl ClassificationGateway {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        channel: EventChannel<ClassificationEvent>,
        log: SharedTransparencyLog,
    ) -> Self {
        Self {
            classifier,
            channel,
            source: DEFAULT_SOURCE.to_string(),
            log,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Classify one feature vector and publish the resulting event.
    ///
    /// Returns the published event, or `None` when the vector is malformed or
    /// the classifier fails.
    pub fn recognize(
        &self,
        features: FeatureVector,
        window_ts: f64,
        gated: bool,
    ) -> Option<ClassificationEvent> {
        if let Err(e) = features.check_shape() {
            tracing::warn!(error = %e, "Rejecting malformed feature vector");
            self.log.record_malformed_features();
            return None;
        }

        let tag = match self.classifier.classify(&features) {
            Ok(tag) => tag,
            Err(e) => {
                tracing::error!(error = %e, "Classifier failed");
                self.log.record_classifier_failure();
                return None;
            }
        };

        let event = ClassificationEvent::new(features, window_ts, gated, &self.source, tag);
        tracing::debug!(
            id = %event.id,
            tag = %event.stereotipy_tag(),
            gated,
            window_ts,
            "Publishing classification event"
        );

        self.log.record_event_published();
        if let Some(evicted) = self.channel.publish(IMU_EVENT_KIND, event.clone()) {
            tracing::warn!(id = %evicted.id, "Event channel full, dropped oldest event");
            self.log.record_event_evicted();
            self.log.record_audit(AuditRecord::new(
                evicted.created_at,
                evicted.stereotipy_tag().label(),
                vec![AuditActuation::dropped()],
                evicted.source,
            ));
        }

        Some(event)
    }
}

impl FeatureSink for ClassificationGateway {
    fn on_features(&self, features: FeatureVector, window_ts: f64, gated: bool) {
        self.recognize(features, window_ts, gated);
    }
}
