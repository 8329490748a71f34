//! Error types for trixel-htm.

use thiserror::Error;

/// Result type for HTM operations.
pub type Result<T> = std::result::Result<T, HtmError>;

/// Errors that can occur while addressing trixels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HtmError {
    /// Latitude outside [-90, 90] or longitude outside [-180, 180], or not finite.
    #[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// Requested level is deeper than the mesh supports.
    #[error("level {level} exceeds the maximum level {max}")]
    LevelOutOfRange { level: u8, max: u8 },

    /// Raw value does not encode a trixel.
    #[error("invalid trixel id: {0}")]
    InvalidTrixelId(u64),

    /// No root trixel contains the point (only reachable with a non-unit vector).
    #[error("point is not covered by any root trixel")]
    Uncovered,
}
