//! EEW revision tracker.
//!
//! Real EEW bulletins start noisy and converge as more stations trigger.
//! The tracker holds the truth plus a current error vector; revisions are
//! driven by the detected-station count (first at 3 stations, then every
//! 5 new detections) and either shrink the errors or, when the initial
//! solution was badly wrong, throw it out and redraw smaller ones.

use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;

const MAG_MIN: f64 = 1.0;
const MAG_MAX: f64 = 9.5;

/// First revision requires this many detected stations.
const FIRST_REVISION_COUNT: usize = 3;

/// Later revisions require this many new detections.
const REVISION_STEP: i64 = 5;

/// Errors beyond these bounds trigger an overthrow instead of a decay.
const OVERTHROW_MAG: f64 = 1.0;
const OVERTHROW_DEPTH_KM: f64 = 30.0;

/// Convergence thresholds: position (deg), depth (km), magnitude.
const CONVERGED_POSITION_DEG: f64 = 0.05;
const CONVERGED_DEPTH_KM: f64 = 5.0;
const CONVERGED_MAG: f64 = 0.1;

/// The tracker's current published estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EewEstimate {
    pub lat: f64,
    pub lon: f64,
    pub depth_km: f64,
    pub magnitude: f64,
    pub revisions: u32,
    pub converged: bool,
}

/// What a single revision did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionOutcome {
    pub count: u32,
    pub overthrown: bool,
}

#[derive(Debug, Clone)]
pub struct EewTracker {
    enabled: bool,
    true_lat: f64,
    true_lon: f64,
    true_depth_km: f64,
    true_magnitude: f64,
    lat_error: f64,
    lon_error: f64,
    depth_error: f64,
    mag_error: f64,
    revision_count: u32,
    last_detected_count: usize,
    needs_announcement: bool,
    converged_announced: bool,
}

impl EewTracker {
    /// Create a tracker for the given truth. When enabled, the initial
    /// estimate is perturbed with the scenario RNG; when disabled the
    /// estimate equals truth and the tracker reports converged.
    #[must_use]
    pub fn new(
        true_lat: f64,
        true_lon: f64,
        true_depth_km: f64,
        true_magnitude: f64,
        enabled: bool,
        rng: &mut StdRng,
    ) -> Self {
        let (lat_error, lon_error, depth_error, mag_error) = if enabled {
            (
                rng.gen_range(-0.8..=0.8),
                rng.gen_range(-0.8..=0.8),
                rng.gen_range(-30.0..=30.0),
                rng.gen_range(-0.8..=0.8),
            )
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };
        let tracker = Self {
            enabled,
            true_lat,
            true_lon,
            true_depth_km,
            true_magnitude,
            lat_error,
            lon_error,
            depth_error,
            mag_error,
            revision_count: 0,
            last_detected_count: 0,
            needs_announcement: false,
            converged_announced: false,
        };
        if enabled {
            let est = tracker.estimate();
            tracing::info!(
                lat = est.lat,
                lon = est.lon,
                depth_km = est.depth_km,
                magnitude = est.magnitude,
                "initial EEW estimate published"
            );
        }
        tracker
    }

    /// Feed the current detected-station count (intensity >= 3). Returns
    /// the revision outcome if this call produced one.
    pub fn update(
        &mut self,
        detected_count: usize,
        elapsed: f64,
        rng: &mut StdRng,
    ) -> Option<RevisionOutcome> {
        if !self.enabled {
            return None;
        }
        if self.is_converged() {
            self.note_convergence();
            return None;
        }
        if detected_count < FIRST_REVISION_COUNT {
            return None;
        }

        let increase = detected_count as i64 - self.last_detected_count as i64;
        let should_revise = self.revision_count == 0 || increase >= REVISION_STEP;
        if !should_revise {
            return None;
        }

        self.last_detected_count = detected_count;
        self.revision_count += 1;

        let overthrown =
            self.mag_error.abs() > OVERTHROW_MAG || self.depth_error.abs() > OVERTHROW_DEPTH_KM;
        if overthrown {
            // the solution was junk; redraw fresh, smaller errors
            self.lat_error = rng.gen_range(-0.5..=0.5);
            self.lon_error = rng.gen_range(-0.5..=0.5);
            self.depth_error = rng.gen_range(-20.0..=20.0);
            self.mag_error = rng.gen_range(-0.5..=0.5);
            tracing::info!(
                revision = self.revision_count,
                stations = detected_count,
                elapsed,
                "EEW revision: solution overthrown"
            );
        } else {
            // more stations, more confidence, faster decay
            let decay_rate = if detected_count >= 20 {
                rng.gen_range(0.4..=0.6)
            } else if detected_count >= 10 {
                rng.gen_range(0.3..=0.5)
            } else {
                rng.gen_range(0.2..=0.4)
            };
            let keep = 1.0 - decay_rate;
            self.lat_error *= keep;
            self.lon_error *= keep;
            self.depth_error *= keep;
            self.mag_error *= keep;
            tracing::info!(
                revision = self.revision_count,
                stations = detected_count,
                elapsed,
                "EEW revision published"
            );
        }

        self.needs_announcement = true;
        self.note_convergence();
        Some(RevisionOutcome {
            count: self.revision_count,
            overthrown,
        })
    }

    /// True once every error component is under its convergence threshold.
    /// Errors stop changing after that, so convergence is monotonic.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        if !self.enabled {
            return true;
        }
        self.lat_error.abs() < CONVERGED_POSITION_DEG
            && self.lon_error.abs() < CONVERGED_POSITION_DEG
            && self.depth_error.abs() < CONVERGED_DEPTH_KM
            && self.mag_error.abs() < CONVERGED_MAG
    }

    fn note_convergence(&mut self) {
        if !self.converged_announced && self.is_converged() {
            self.converged_announced = true;
            tracing::info!(
                revisions = self.revision_count,
                "EEW estimate converged"
            );
        }
    }

    /// Current published values: truth plus error, clamped to valid ranges.
    #[must_use]
    pub fn estimate(&self) -> EewEstimate {
        EewEstimate {
            lat: self.true_lat + self.lat_error,
            lon: self.true_lon + self.lon_error,
            depth_km: (self.true_depth_km + self.depth_error).max(0.0),
            magnitude: (self.true_magnitude + self.mag_error).clamp(MAG_MIN, MAG_MAX),
            revisions: self.revision_count,
            converged: self.is_converged(),
        }
    }

    /// One-shot correction-announcement flag; returns true at most once
    /// per revision.
    pub fn consume_announcement(&mut self) -> bool {
        if self.needs_announcement {
            self.needs_announcement = false;
            return true;
        }
        false
    }

    #[must_use]
    pub fn revision_count(&self) -> u32 {
        self.revision_count
    }
}
