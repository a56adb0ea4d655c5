//! Core pipeline of the STOPme agent.
//!
//! This module contains:
//! - Stream synchronization of the two wrist sensors
//! - Sliding-window framing with calibration gating
//! - Classification and the bounded event channel
//! - The dispatcher and activation policy that drive actuators

pub mod channel;
pub mod dispatcher;
pub mod framer;
pub mod gateway;
pub mod native;
pub mod policy;
pub mod synchronizer;
pub mod types;

// Re-export commonly used types
pub use channel::EventChannel;
pub use dispatcher::{DispatchOutcome, DispatcherHandle, EventDispatcher};
pub use framer::{FeatureSink, WindowFramer};
pub use gateway::{ClassificationGateway, DEFAULT_SOURCE, IMU_EVENT_KIND};
pub use native::{Classifier, FeatureExtractor, NativeError};
pub use policy::{ActivationPolicy, PolicyState};
pub use synchronizer::{RowSink, SyncStats, Synchronizer};
pub use types::{
    ClassificationEvent, FeatureShapeError, FeatureVector, JointRow, Severity, StereotipyTag,
    Window, WindowChannels, WristChannels, WristTriplet, FEATURE_COUNT, ROW_WIDTH,
};
