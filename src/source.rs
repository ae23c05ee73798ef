//! Point-source hypocenter model.
//!
//! A [`PointSource`] owns its own elapsed time and derives P/S surface
//! radii and per-site arrival times from it. All distances come from the
//! km-plane projection.

use serde::Serialize;

use crate::projection;

/// A P/S propagation speed pair in km/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaveSpeeds {
    pub p_km_s: f64,
    pub s_km_s: f64,
}

impl WaveSpeeds {
    /// Speeds used by all arrival-time and radius math.
    pub const SIMULATION: Self = Self {
        p_km_s: 6.5,
        s_km_s: 4.0,
    };

    /// Realistic crustal speeds, exposed for callers that want them.
    /// Not consumed by the propagation math.
    pub const PHYSICAL: Self = Self {
        p_km_s: 7.3,
        s_km_s: 4.1,
    };
}

impl Default for WaveSpeeds {
    fn default() -> Self {
        Self::SIMULATION
    }
}

/// One hypocenter with its own elapsed clock.
///
/// `time` is seconds since this source activated and only moves forward;
/// EEW revisions may rewrite the location and magnitude but never the clock.
#[derive(Debug, Clone)]
pub struct PointSource {
    pub lat: f64,
    pub lon: f64,
    pub depth_km: f64,
    pub magnitude: f64,
    pub time: f64,
    speeds: WaveSpeeds,
}

impl PointSource {
    #[must_use]
    pub fn new(lat: f64, lon: f64, depth_km: f64, magnitude: f64) -> Self {
        Self {
            lat,
            lon,
            depth_km,
            magnitude,
            time: 0.0,
            speeds: WaveSpeeds::default(),
        }
    }

    /// Advance the source clock. Negative steps are ignored; the clock is
    /// monotonic between resets.
    pub fn advance(&mut self, dt: f64) {
        if dt > 0.0 {
            self.time += dt;
        }
    }

    #[must_use]
    pub fn speeds(&self) -> WaveSpeeds {
        self.speeds
    }

    /// Surface radius of a wave front travelling at `v` km/s: zero until the
    /// front breaks the surface above the hypocenter, then the circle of
    /// intersection with the ground plane.
    fn surface_radius_km(&self, v: f64) -> f64 {
        let reach = v * self.time;
        if reach <= self.depth_km {
            0.0
        } else {
            (reach * reach - self.depth_km * self.depth_km).sqrt()
        }
    }

    #[must_use]
    pub fn p_wave_radius_km(&self) -> f64 {
        self.surface_radius_km(self.speeds.p_km_s)
    }

    #[must_use]
    pub fn s_wave_radius_km(&self) -> f64 {
        self.surface_radius_km(self.speeds.s_km_s)
    }

    /// Epicentral distance to a site, on the km-plane.
    #[must_use]
    pub fn epicentral_distance_km(&self, lat: f64, lon: f64) -> f64 {
        projection::distance_km(self.lat, self.lon, lat, lon)
    }

    /// Slant distance from the hypocenter to a surface site.
    #[must_use]
    pub fn hypocentral_distance_km(&self, lat: f64, lon: f64) -> f64 {
        let d = self.epicentral_distance_km(lat, lon);
        d.hypot(self.depth_km)
    }

    /// Seconds after activation at which the P front reaches a site.
    #[must_use]
    pub fn p_arrival_time(&self, lat: f64, lon: f64) -> f64 {
        self.hypocentral_distance_km(lat, lon) / self.speeds.p_km_s
    }

    /// Seconds after activation at which the S front reaches a site.
    #[must_use]
    pub fn s_arrival_time(&self, lat: f64, lon: f64) -> f64 {
        self.hypocentral_distance_km(lat, lon) / self.speeds.s_km_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_zero_before_breakout() {
        let mut eq = PointSource::new(35.7, 139.7, 10.0, 6.0);
        eq.advance(0.1);
        // 6.5 * 0.1 = 0.65 km of travel, still under 10 km of rock
        assert!((eq.p_wave_radius_km() - 0.0).abs() < 1e-12);
        assert!((eq.s_wave_radius_km() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_radius_at_surface_focus() {
        let mut eq = PointSource::new(35.0, 139.0, 0.0, 5.0);
        eq.advance(3.0);
        assert!((eq.p_wave_radius_km() - 6.5 * 3.0).abs() < 1e-9);
        assert!((eq.s_wave_radius_km() - 4.0 * 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_radius_pythagorean() {
        let mut eq = PointSource::new(35.0, 139.0, 30.0, 7.0);
        eq.advance(10.0); // P has travelled 65 km
        let expected = (65.0f64 * 65.0 - 30.0 * 30.0).sqrt();
        assert!((eq.p_wave_radius_km() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_arrival_directly_above() {
        let eq = PointSource::new(35.7, 139.7, 13.0, 6.0);
        // d_epi = 0 so the wave arrives after depth / v, never earlier
        assert!((eq.p_arrival_time(35.7, 139.7) - 13.0 / 6.5).abs() < 1e-9);
        assert!((eq.s_arrival_time(35.7, 139.7) - 13.0 / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_p_no_later_than_s() {
        let eq = PointSource::new(36.0, 140.0, 40.0, 7.5);
        for &(lat, lon) in &[(36.0, 140.0), (35.0, 139.0), (38.5, 142.0)] {
            assert!(eq.p_arrival_time(lat, lon) <= eq.s_arrival_time(lat, lon));
        }
    }

    #[test]
    fn test_speed_pairs_stay_distinct() {
        // propagation math runs on the simulation pair, not the
        // realistic crustal speeds
        let eq = PointSource::new(35.0, 139.0, 0.0, 6.0);
        assert_eq!(eq.speeds(), WaveSpeeds::SIMULATION);
        assert!(WaveSpeeds::PHYSICAL.p_km_s > WaveSpeeds::SIMULATION.p_km_s);
        assert!(WaveSpeeds::PHYSICAL.s_km_s > WaveSpeeds::SIMULATION.s_km_s);
    }

    #[test]
    fn test_clock_ignores_negative_steps() {
        let mut eq = PointSource::new(35.0, 139.0, 10.0, 6.0);
        eq.advance(2.0);
        eq.advance(-1.0);
        assert!((eq.time - 2.0).abs() < 1e-12);
    }
}
