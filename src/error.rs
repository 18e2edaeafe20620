//! Error taxonomy for the conduction-velocity pipeline.
//!
//! Validation failures (bad channel, bad frame range, wrong array shape) are
//! fatal and returned at the call site.  Numerical edge cases (flat arrival
//! surface, zero gradient) are not errors: they surface as flags and `NaN`
//! entries in the results.
use thiserror::Error;

use crate::surface::N_COEF;

#[derive(Debug, Error)]
pub enum MeaError {
    #[error("channel {channel} is outside 1..=64")]
    InvalidChannel { channel: i64 },

    #[error("surface fit needs at least {required} electrodes, got {samples}")]
    InsufficientData { samples: usize, required: usize },

    #[error("electrode support is rank deficient; cubic surface is under-determined")]
    RankDeficient,

    #[error("frame range {start}..{end} is invalid for {len} samples")]
    InvalidTimeRange { start: usize, end: usize, len: usize },

    #[error("{what}: expected {expected}, got {actual}")]
    ShapeMismatch { what: &'static str, expected: usize, actual: usize },

    #[error("peak index {index} on channel {channel} is past the end of the recording ({len} samples)")]
    PeakOutOfRange { channel: u8, index: usize, len: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("conduction analysis cancelled")]
    Cancelled,
}

impl MeaError {
    pub(crate) fn insufficient(samples: usize) -> Self {
        MeaError::InsufficientData { samples, required: N_COEF }
    }

    /// `true` for errors the aggregator may recover from by skipping a beat.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MeaError::InsufficientData { .. } | MeaError::RankDeficient)
    }
}

pub type Result<T> = std::result::Result<T, MeaError>;
