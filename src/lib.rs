//! STOPme agent - real-time stereotypy detection with sensory feedback.
//!
//! This library turns two wrist-worn motion sensors into feedback actions:
//! it aligns the two sample streams, frames them into overlapping windows,
//! hands each window to a feature extractor and a classifier, and drives
//! light, vibration and audio actuators when a stereotypic movement is
//! detected.
//!
//! # Guarantees
//!
//! - **Never blocks the listeners**: the event channel drops its oldest event
//!   instead of waiting for the dispatcher
//! - **Most recent wins**: the newest classification is always retained
//! - **Calibrated before acting**: actuation is gated until the reference
//!   pose has been captured
//! - **Transparency**: every dispatched, gated or dropped event is audited
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          STOPme agent                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌────────────────┐          │
//! │  │Synchronizer │──▶│   Framer    │──▶│    Gateway     │          │
//! │  │ (L/R align) │   │ (windows)   │   │ (classify)     │          │
//! │  └─────────────┘   └─────────────┘   └────────────────┘          │
//! │         ▲                                    │ drop-oldest        │
//! │         │                                    ▼                   │
//! │  ┌─────────────┐   ┌─────────────┐   ┌────────────────┐          │
//! │  │   Wrist     │   │  Actuators  │◀──│  Dispatcher    │          │
//! │  │ listeners   │   │ (sessions)  │   │  + Policy      │          │
//! │  └─────────────┘   └─────────────┘   └────────────────┘          │
//! │                                              │                   │
//! │                                      ┌────────────────┐          │
//! │                                      │ Transparency   │          │
//! │                                      │     Log        │          │
//! │                                      └────────────────┘          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stopme_agent::{
//!     actuator::DryRunActuators,
//!     config::Config,
//!     core::{FeatureVector, NativeError},
//!     device::SampleKind,
//!     transparency::create_shared_log,
//!     Pipeline,
//! };
//! # struct MyExtractor;
//! # impl stopme_agent::core::FeatureExtractor for MyExtractor {
//! #     fn extract(&mut self, _: &stopme_agent::core::WindowChannels, _: bool)
//! #         -> Result<FeatureVector, NativeError> { Ok(FeatureVector::new(vec![0.0; 18])) }
//! # }
//!
//! let config = Config::load().expect("Failed to load config");
//! let classifier = |_: &FeatureVector| -> Result<i32, NativeError> { Ok(0) };
//! let actuators = Arc::new(DryRunActuators::new(vec!["meta_AA:BB:CC:DD:EE:FF".into()]));
//!
//! let mut pipeline = Pipeline::new(
//!     &config,
//!     Box::new(MyExtractor),
//!     Arc::new(classifier),
//!     actuators,
//!     create_shared_log(),
//! );
//! pipeline.start();
//!
//! // Listener callbacks feed samples as they arrive.
//! let sync = pipeline.synchronizer();
//! sync.update("bc_left", SampleKind::Acc, &[0.0, 0.0, 1000.0], 0.01);
//! ```

pub mod actuator;
pub mod clock;
pub mod config;
pub mod core;
pub mod device;
pub mod pipeline;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use actuator::{ActuationCommand, ActuationParams, ActuatorManager};
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use config::{Config, ConfigError};
pub use core::{ClassificationEvent, Classifier, FeatureExtractor, StereotipyTag, Synchronizer};
pub use device::{ImuSample, SampleKind};
pub use pipeline::Pipeline;
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
