//! Error types for the simulation engine.
//!
//! Uses `thiserror` for library-style error definitions. Only fatal,
//! caller-fixable conditions surface here; numerical edge cases (zero-length
//! fault segments, co-located stations, non-positive site amplification) are
//! absorbed by guards inside the engine.

use thiserror::Error;

use crate::engine::ScenarioHandle;

/// Errors surfaced at the engine API boundary.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Hypocenter depth below the surface datum
    #[error("depth must be non-negative, got {0} km")]
    InvalidDepth(f64),

    /// Magnitude outside the supported JMA-style range
    #[error("magnitude {0} outside supported range [1.0, 9.5]")]
    InvalidMagnitude(f64),

    /// A multi-source scenario needs a usable rupture path
    #[error("fault polyline needs at least 2 vertices, got {0}")]
    InvalidPolyline(usize),

    /// Rupture must propagate
    #[error("rupture velocity must be positive, got {0} km/s")]
    InvalidRuptureVelocity(f64),

    /// Start source must be one of the configured sources
    #[error("start source index {index} out of range ({len} sources)")]
    InvalidStartIndex { index: usize, len: usize },

    /// Unrecognized rupture direction keyword
    #[error("unknown rupture direction: {0} (expected: forward, backward, both)")]
    UnknownDirection(String),

    /// Time scale must keep the clock running forward
    #[error("time scale must be positive, got {0}")]
    InvalidTimeScale(f64),

    /// Handle refers to a scenario that has been reset
    #[error("stale scenario handle: {0}")]
    StaleHandle(ScenarioHandle),

    /// The virtual clock never moves backward
    #[error("tick must not move backward: dt = {0} s")]
    NegativeTick(f64),
}
