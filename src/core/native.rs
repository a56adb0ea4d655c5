//! Contracts of the native numeric routines.
//!
//! Feature extraction and classification are black boxes: the pipeline only
//! calls them through these traits and treats any error as "drop this window"
//! or "drop this event".

use crate::core::types::{FeatureVector, WindowChannels};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("input rejected: {0}")]
    InvalidInput(String),

    #[error("native routine failed: {0}")]
    Failed(String),

    #[error("native library unavailable: {0}")]
    Unavailable(String),
}

/// Turns one window's channels into a feature vector.
///
/// `calibrate` is true exactly once, for the first window after warm-up; the
/// implementation captures its reference pose from that window and computes
/// every later vector relative to it.
pub trait FeatureExtractor: Send {
    fn extract(
        &mut self,
        channels: &WindowChannels,
        calibrate: bool,
    ) -> Result<FeatureVector, NativeError>;
}

/// Maps a feature vector to an integer stereotypy tag.
pub trait Classifier: Send + Sync {
    fn classify(&self, features: &FeatureVector) -> Result<i32, NativeError>;
}

impl<F> Classifier for F
where
    F: Fn(&FeatureVector) -> Result<i32, NativeError> + Send + Sync,
{
    fn classify(&self, features: &FeatureVector) -> Result<i32, NativeError> {
        self(features)
    }
}
