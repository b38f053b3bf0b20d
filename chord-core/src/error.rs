//! # Error Module
//!
//! Construction-time failures of the detection core. Per-block anomalies
//! (silence, noise, empty blocks) are never reported here: the components
//! return empty results for those and the next block is unaffected.

use thiserror::Error;

/// Errors raised while validating a configuration or building a component.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// The transform size is odd or too small to carry a usable spectrum.
    #[error("transform size must be an even number of at least {min} samples, got {got}")]
    InvalidTransformSize {
        /// Smallest accepted transform size.
        min: usize,
        /// The rejected size.
        got: usize,
    },

    /// A sample rate of zero was supplied.
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,

    /// The detection frequency range is empty or not positive.
    #[error("invalid frequency range {min} Hz to {max} Hz")]
    InvalidFrequencyRange {
        /// Lower bound in Hz.
        min: f32,
        /// Upper bound in Hz.
        max: f32,
    },

    /// Any other out-of-range setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
