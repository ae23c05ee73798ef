//! Station observation state machines.
//!
//! Each station latches P/S arrivals, derives a target intensity from the
//! governing source(s), and grows its displayed intensity toward that
//! target with the randomized progressive-growth rule. Stations never hold
//! a reference to a source; updates take source state as arguments.

use std::collections::BTreeSet;

use rand::Rng;
use rand::rngs::StdRng;

use crate::intensity::{self, JmaScale};
use crate::rupture::RuptureScheduler;
use crate::source::PointSource;

/// Sentinel intensity for a station no wave has reached.
pub const UNTRIGGERED: f64 = -3.0;

/// Envelope values below this never trigger a station.
const DISPLAY_THRESHOLD: f64 = 0.5;

/// Minimum displayed growth in intensity units per second.
const MIN_GROWTH_PER_SEC: f64 = 0.5;

/// Static station definition.
#[derive(Debug, Clone)]
pub struct StationInfo {
    pub id: u32,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    /// Site amplification factor; 1.0 for average ground.
    pub amp: f64,
}

/// One observation station with its mutable per-scenario state.
#[derive(Debug, Clone)]
pub struct Station {
    pub info: StationInfo,
    pub intensity: f64,
    pub target_intensity: f64,
    pub max_intensity: f64,
    pub p_arrived: bool,
    pub s_arrived: bool,
    pub s_dominant: bool,
    pub time_since_peak: f64,
    /// Scenario time of the first P detection.
    pub p_arrival_time: Option<f64>,
    pub p_amplitude: f64,
}

impl Station {
    #[must_use]
    pub fn new(info: StationInfo) -> Self {
        Self {
            info,
            intensity: UNTRIGGERED,
            target_intensity: UNTRIGGERED,
            max_intensity: UNTRIGGERED,
            p_arrived: false,
            s_arrived: false,
            s_dominant: false,
            time_since_peak: 0.0,
            p_arrival_time: None,
            p_amplitude: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.intensity = UNTRIGGERED;
        self.target_intensity = UNTRIGGERED;
        self.max_intensity = UNTRIGGERED;
        self.p_arrived = false;
        self.s_arrived = false;
        self.s_dominant = false;
        self.time_since_peak = 0.0;
        self.p_arrival_time = None;
        self.p_amplitude = 0.0;
    }

    fn latch_p(&mut self, scenario_time: f64, magnitude: f64, d_epi: f64) {
        if !self.p_arrived {
            self.p_arrived = true;
            self.p_arrival_time = Some(scenario_time);
            self.p_amplitude = 10.0_f64.powf(magnitude - 1.5) / d_epi.max(1.0);
        }
    }

    /// Single-source update: arrival latches, peak-based target, growth.
    pub fn update_single(&mut self, source: &PointSource, dt: f64, rng: &mut StdRng) {
        let now = source.time;
        let d_epi = source.epicentral_distance_km(self.info.lat, self.info.lon);

        if now >= source.p_arrival_time(self.info.lat, self.info.lon) {
            self.latch_p(now, source.magnitude, d_epi);
        }
        if now >= source.s_arrival_time(self.info.lat, self.info.lon) {
            self.s_arrived = true;
        }

        if !self.p_arrived {
            self.target_intensity = UNTRIGGERED;
            self.intensity = UNTRIGGERED;
            return;
        }

        let bai = intensity::site_bai(self.info.amp);
        let s_peak = intensity::jma_intensity(source.magnitude, source.depth_km, d_epi, bai);
        if self.s_arrived {
            self.target_intensity = s_peak.max(UNTRIGGERED);
            self.s_dominant = true;
        } else {
            // P proxy while only the P phase shakes the site
            self.target_intensity = (s_peak / 1.5 - 0.5).max(UNTRIGGERED);
            self.s_dominant = false;
        }

        self.grow(source.magnitude, dt, rng);
    }

    /// Multi-source update: the target is the pointwise-max envelope over
    /// all active sources.
    pub fn update_multi(&mut self, scheduler: &RuptureScheduler, dt: f64, rng: &mut StdRng) {
        for src in scheduler.active_sources() {
            let elapsed = src.source.time;
            if elapsed >= src.source.p_arrival_time(self.info.lat, self.info.lon) {
                let d_epi = src.source.epicentral_distance_km(self.info.lat, self.info.lon);
                self.latch_p(scheduler.time, src.source.magnitude, d_epi);
            }
            if elapsed >= src.source.s_arrival_time(self.info.lat, self.info.lon) {
                self.s_arrived = true;
            }
        }

        let (value, is_s) = scheduler.calc_intensity(self.info.lat, self.info.lon, self.info.amp);
        let triggered = self.intensity > UNTRIGGERED;
        if !self.p_arrived || (value < DISPLAY_THRESHOLD && !triggered) {
            self.target_intensity = UNTRIGGERED;
            self.intensity = UNTRIGGERED;
            return;
        }

        self.target_intensity = value;
        self.s_dominant = is_s;
        let Some(magnitude) =
            scheduler.governing_magnitude(self.info.lat, self.info.lon, self.info.amp)
        else {
            return;
        };
        self.grow(magnitude, dt, rng);
    }

    /// Progressive growth toward the target: fast while low, slowing near
    /// the cap, with a randomized per-tick increment and a hard floor.
    fn grow(&mut self, magnitude: f64, dt: f64, rng: &mut StdRng) {
        let p_only = self.p_arrived && !self.s_arrived;

        let current = (self.intensity + 3.0).max(0.01);
        let growth_factor = (1.0 / current).ln() / 7.0_f64.ln() + 1.0;

        let base = 0.005 + 0.04 / (magnitude + 0.2).ln();
        let mut factor = rng.gen_range(base * 0.3..=base);
        if p_only {
            factor *= 0.5;
        }

        let increment = (growth_factor * factor * dt * 60.0).max(MIN_GROWTH_PER_SEC * dt);

        if self.intensity + increment < self.target_intensity {
            self.intensity += increment;
            self.time_since_peak = 0.0;
        } else {
            self.intensity = self.target_intensity;
            self.time_since_peak += dt;
        }

        self.max_intensity = self.max_intensity.max(self.intensity);
    }

    /// Current JMA band of the displayed intensity.
    #[must_use]
    pub fn scale(&self) -> JmaScale {
        JmaScale::from_intensity(self.intensity)
    }
}

/// The full set of stations for a scenario.
#[derive(Debug, Clone)]
pub struct StationSet {
    stations: Vec<Station>,
}

impl StationSet {
    #[must_use]
    pub fn new(infos: Vec<StationInfo>) -> Self {
        Self {
            stations: infos.into_iter().map(Station::new).collect(),
        }
    }

    #[must_use]
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub(crate) fn stations_mut(&mut self) -> &mut [Station] {
        &mut self.stations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn reset(&mut self) {
        for station in &mut self.stations {
            station.reset();
        }
    }

    /// Update every station against a single source. Returns the integer
    /// JMA major levels present after the update.
    pub fn update_single(
        &mut self,
        source: &PointSource,
        dt: f64,
        rng: &mut StdRng,
    ) -> BTreeSet<u8> {
        let mut levels = BTreeSet::new();
        for station in &mut self.stations {
            station.update_single(source, dt, rng);
            if let Some(level) = station.scale().major_level() {
                levels.insert(level);
            }
        }
        levels
    }

    /// Update every station against the rupture scheduler. Returns the
    /// integer JMA major levels present after the update.
    pub fn update_multi(
        &mut self,
        scheduler: &RuptureScheduler,
        dt: f64,
        rng: &mut StdRng,
    ) -> BTreeSet<u8> {
        let mut levels = BTreeSet::new();
        for station in &mut self.stations {
            station.update_multi(scheduler, dt, rng);
            if let Some(level) = station.scale().major_level() {
                levels.insert(level);
            }
        }
        levels
    }

    /// Stations currently at or above an intensity threshold.
    #[must_use]
    pub fn count_at_or_above(&self, threshold: f64) -> usize {
        self.stations
            .iter()
            .filter(|s| s.intensity >= threshold)
            .count()
    }

    #[must_use]
    pub fn max_intensity(&self) -> f64 {
        self.stations
            .iter()
            .map(|s| s.intensity)
            .fold(UNTRIGGERED, f64::max)
    }

    /// Concatenated one-decimal intensities above 2.5, in station order.
    /// Two equal signatures mean the strong-motion picture is stable.
    #[must_use]
    pub fn stability_signature(&self) -> String {
        use std::fmt::Write as _;
        let mut signature = String::new();
        for station in &self.stations {
            if station.intensity > 2.5 {
                let _ = write!(signature, "{:.1}", station.intensity);
            }
        }
        signature
    }
}
