//! Device-facing side of the agent.
//!
//! This module provides the sample types wrist listeners produce and the
//! generic session worker that keeps a physical device connected.

pub mod session;
pub mod types;

// Re-export commonly used types
pub use session::{
    DeviceDriver, DeviceError, DeviceScanner, DeviceSession, ScanGuard, SessionCommand,
    SessionStatus, StatusUpdate,
};
pub use types::{ImuSample, SampleKind, UnknownSampleKind, WristSide};
