//! Simulation driver.
//!
//! Owns the scenarios and their virtual clocks. Each `tick` runs the fixed
//! pipeline (advance sources, update stations, rebuild regions, feed the
//! tracker, detect stability) and reports the frame's events. External
//! consumers only ever see immutable snapshots.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::errors::EngineError;
use crate::regions::{Region, RegionIndex, RegionMax};
use crate::rupture::{Direction, FaultPolyline, RuptureScheduler, SourceSpec};
use crate::source::PointSource;
use crate::stations::{StationInfo, StationSet};
use crate::tracker::{EewEstimate, EewTracker};

/// Supported magnitude range for any configured source.
const MAG_RANGE: std::ops::RangeInclusive<f64> = 1.0..=9.5;

/// Detection threshold feeding the tracker: stations at shindo 3 or more.
const DETECTION_INTENSITY: f64 = 3.0;

/// Opaque identifier for a live scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScenarioHandle(u64);

impl fmt::Display for ScenarioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario-{}", self.0)
    }
}

/// Per-scenario creation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioOptions {
    /// Track a noisy EEW estimate that converges toward truth.
    pub eew_tracking: bool,
    /// RNG seed for reproducible runs; fresh entropy when absent.
    pub seed: Option<u64>,
}

/// Events emitted by one tick.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub scenario_time: f64,
    /// Integer JMA major levels crossed for the first time this scenario,
    /// ascending.
    pub new_intensity_levels: BTreeSet<u8>,
    pub revision: Option<RevisionEvent>,
    pub final_report: bool,
    /// Change in the number of stations at or above shindo 3. Negative
    /// while envelopes decay.
    pub station_detections_delta: i64,
}

/// A published EEW correction.
#[derive(Debug, Clone, Serialize)]
pub struct RevisionEvent {
    pub count: u32,
    pub new_estimate: EewEstimate,
    pub overthrown: bool,
}

/// Read-only view of a scenario, exported at end of tick.
#[derive(Debug, Clone, Serialize)]
pub struct SceneSnapshot {
    pub scenario_time: f64,
    pub sources: Vec<SourceSnapshot>,
    pub stations: Vec<StationSnapshot>,
    pub region_max: BTreeMap<String, f64>,
    pub overall_max: f64,
    pub overall_max_region_name: String,
    /// Present in single mode only.
    pub eew_estimate: Option<EewEstimate>,
    /// Label for the governing epicenter, when a name lookup is installed.
    pub epicenter_name: Option<String>,
}

/// Callback resolving an epicenter label from (lat, lon).
pub type EpicenterNamer = Box<dyn Fn(f64, f64) -> String + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct SourceSnapshot {
    pub lat: f64,
    pub lon: f64,
    pub depth_km: f64,
    pub magnitude: f64,
    pub p_radius_km: f64,
    pub s_radius_km: f64,
    pub elapsed: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationSnapshot {
    pub id: u32,
    pub lat: f64,
    pub lon: f64,
    pub intensity: f64,
    pub is_s_dominant: bool,
    pub p_arrived: bool,
    pub s_arrived: bool,
    pub p_arrival_time: Option<f64>,
}

enum ScenarioMode {
    Single {
        source: PointSource,
        tracker: EewTracker,
    },
    Multi {
        scheduler: RuptureScheduler,
    },
}

struct Scenario {
    mode: ScenarioMode,
    stations: StationSet,
    region_max: RegionMax,
    time: f64,
    time_scale: f64,
    rng: StdRng,
    fired_levels: BTreeSet<u8>,
    last_signature: String,
    stable_time: f64,
    final_report_fired: bool,
    prev_detected: usize,
}

/// The engine: loaded geometry plus the set of live scenarios.
pub struct Engine {
    station_infos: Vec<StationInfo>,
    regions: RegionIndex,
    scenarios: HashMap<u64, Scenario>,
    next_handle: u64,
    namer: Option<EpicenterNamer>,
}

impl Engine {
    /// Build an engine over loaded station and region inputs. Empty inputs
    /// are accepted; callers just get empty snapshots.
    #[must_use]
    pub fn new(stations: Vec<StationInfo>, regions: Vec<Region>) -> Self {
        tracing::info!(
            stations = stations.len(),
            regions = regions.len(),
            "engine ready"
        );
        Self {
            station_infos: stations,
            regions: RegionIndex::new(regions),
            scenarios: HashMap::new(),
            next_handle: 0,
            namer: None,
        }
    }

    /// Install a callback that labels epicenters in snapshots.
    pub fn set_epicenter_namer(&mut self, namer: EpicenterNamer) {
        self.namer = Some(namer);
    }

    fn validate_hypocenter(depth_km: f64, magnitude: f64) -> Result<(), EngineError> {
        if !depth_km.is_finite() || depth_km < 0.0 {
            return Err(EngineError::InvalidDepth(depth_km));
        }
        if !magnitude.is_finite() || !MAG_RANGE.contains(&magnitude) {
            return Err(EngineError::InvalidMagnitude(magnitude));
        }
        Ok(())
    }

    fn make_rng(options: ScenarioOptions) -> StdRng {
        options
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
    }

    fn register(&mut self, scenario: Scenario) -> ScenarioHandle {
        let handle = ScenarioHandle(self.next_handle);
        self.next_handle += 1;
        self.scenarios.insert(handle.0, scenario);
        handle
    }

    /// Create a single-hypocenter scenario. With tracking enabled the wave
    /// source starts at the tracker's noisy estimate and teleports toward
    /// truth as revisions land.
    pub fn create_single_scenario(
        &mut self,
        lat: f64,
        lon: f64,
        depth_km: f64,
        magnitude: f64,
        options: ScenarioOptions,
    ) -> Result<ScenarioHandle, EngineError> {
        Self::validate_hypocenter(depth_km, magnitude)?;
        let mut rng = Self::make_rng(options);
        let tracker = EewTracker::new(lat, lon, depth_km, magnitude, options.eew_tracking, &mut rng);
        let estimate = tracker.estimate();
        let source = PointSource::new(
            estimate.lat,
            estimate.lon,
            estimate.depth_km,
            estimate.magnitude,
        );
        let scenario = Scenario::new(
            ScenarioMode::Single { source, tracker },
            StationSet::new(self.station_infos.clone()),
            rng,
        );
        Ok(self.register(scenario))
    }

    /// Create a multi-source rupture scenario along a fault polyline.
    pub fn create_multi_scenario(
        &mut self,
        polyline: &[(f64, f64)],
        sources: &[SourceSpec],
        start_index: usize,
        direction: Direction,
        rupture_velocity: f64,
        options: ScenarioOptions,
    ) -> Result<ScenarioHandle, EngineError> {
        if polyline.len() < 2 {
            return Err(EngineError::InvalidPolyline(polyline.len()));
        }
        if !rupture_velocity.is_finite() || rupture_velocity <= 0.0 {
            return Err(EngineError::InvalidRuptureVelocity(rupture_velocity));
        }
        for spec in sources {
            Self::validate_hypocenter(spec.depth_km, spec.magnitude)?;
        }
        if !sources.is_empty() && start_index >= sources.len() {
            return Err(EngineError::InvalidStartIndex {
                index: start_index,
                len: sources.len(),
            });
        }
        let scheduler = RuptureScheduler::new(
            FaultPolyline::new(polyline),
            sources,
            start_index,
            direction,
            rupture_velocity,
        );
        let scenario = Scenario::new(
            ScenarioMode::Multi { scheduler },
            StationSet::new(self.station_infos.clone()),
            Self::make_rng(options),
        );
        Ok(self.register(scenario))
    }

    /// Advance a scenario by `dt` seconds (scaled by its time scale) and
    /// collect the frame's events.
    pub fn tick(&mut self, handle: ScenarioHandle, dt: f64) -> Result<FrameReport, EngineError> {
        if dt < 0.0 || dt.is_nan() {
            return Err(EngineError::NegativeTick(dt));
        }
        let Self {
            scenarios, regions, ..
        } = self;
        let scenario = scenarios
            .get_mut(&handle.0)
            .ok_or(EngineError::StaleHandle(handle))?;
        Ok(scenario.tick(dt, regions))
    }

    /// Export the read-only end-of-tick view. Draws no randomness.
    pub fn snapshot(&self, handle: ScenarioHandle) -> Result<SceneSnapshot, EngineError> {
        self.scenarios
            .get(&handle.0)
            .map(|scenario| scenario.snapshot(self.namer.as_deref()))
            .ok_or(EngineError::StaleHandle(handle))
    }

    /// Destroy a scenario. The handle becomes stale; the station-region
    /// cache is bound to the loaded geometry and survives.
    pub fn reset(&mut self, handle: ScenarioHandle) -> Result<(), EngineError> {
        self.scenarios
            .remove(&handle.0)
            .map(|_| ())
            .ok_or(EngineError::StaleHandle(handle))
    }

    /// Change the clock multiplier applied to subsequent ticks.
    pub fn set_time_scale(
        &mut self,
        handle: ScenarioHandle,
        factor: f64,
    ) -> Result<(), EngineError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(EngineError::InvalidTimeScale(factor));
        }
        let scenario = self
            .scenarios
            .get_mut(&handle.0)
            .ok_or(EngineError::StaleHandle(handle))?;
        scenario.time_scale = factor;
        Ok(())
    }
}

impl Scenario {
    fn new(mode: ScenarioMode, stations: StationSet, rng: StdRng) -> Self {
        Self {
            mode,
            stations,
            region_max: RegionMax::default(),
            time: 0.0,
            time_scale: 1.0,
            rng,
            fired_levels: BTreeSet::new(),
            last_signature: String::new(),
            stable_time: 0.0,
            final_report_fired: false,
            prev_detected: 0,
        }
    }

    /// One pipeline pass. Order is part of the observable contract:
    /// advance, stations, regions, tracker, events.
    fn tick(&mut self, dt: f64, regions: &mut RegionIndex) -> FrameReport {
        let dt = dt * self.time_scale;
        self.time += dt;

        match &mut self.mode {
            ScenarioMode::Single { source, .. } => source.advance(dt),
            ScenarioMode::Multi { scheduler } => scheduler.update(dt),
        }

        let levels = match &self.mode {
            ScenarioMode::Single { source, .. } => {
                self.stations.update_single(source, dt, &mut self.rng)
            }
            ScenarioMode::Multi { scheduler } => {
                self.stations.update_multi(scheduler, dt, &mut self.rng)
            }
        };
        let new_intensity_levels: BTreeSet<u8> =
            levels.difference(&self.fired_levels).copied().collect();
        self.fired_levels.extend(&new_intensity_levels);

        self.region_max = regions.aggregate(self.stations.stations());

        let detected = self.stations.count_at_or_above(DETECTION_INTENSITY);
        let mut revision = None;
        if let ScenarioMode::Single { source, tracker } = &mut self.mode {
            if let Some(outcome) = tracker.update(detected, source.time, &mut self.rng) {
                let estimate = tracker.estimate();
                // teleport the front; the elapsed clock is preserved
                source.lat = estimate.lat;
                source.lon = estimate.lon;
                source.depth_km = estimate.depth_km;
                source.magnitude = estimate.magnitude;
                if tracker.consume_announcement() {
                    revision = Some(RevisionEvent {
                        count: outcome.count,
                        new_estimate: estimate,
                        overthrown: outcome.overthrown,
                    });
                }
            }
        }

        let final_report = self.check_final_report(dt);

        let station_detections_delta = detected as i64 - self.prev_detected as i64;
        self.prev_detected = detected;

        FrameReport {
            scenario_time: self.time,
            new_intensity_levels,
            revision,
            final_report,
            station_detections_delta,
        }
    }

    /// Fire the final report once the strong-motion picture has been
    /// stable for `e^M * 0.3` seconds.
    fn check_final_report(&mut self, dt: f64) -> bool {
        let signature = self.stations.stability_signature();
        if signature == self.last_signature && !signature.is_empty() {
            self.stable_time += dt;
        } else {
            self.stable_time = 0.0;
            self.last_signature = signature;
            self.final_report_fired = false;
        }

        let magnitude = match &self.mode {
            ScenarioMode::Single { source, .. } => source.magnitude,
            ScenarioMode::Multi { scheduler } => scheduler.max_magnitude(),
        };
        let threshold = magnitude.exp() * 0.3;

        if self.stable_time > threshold
            && !self.final_report_fired
            && !self.last_signature.is_empty()
        {
            self.final_report_fired = true;
            tracing::info!(stable_secs = self.stable_time, "final report issued");
            return true;
        }
        false
    }

    fn snapshot(&self, namer: Option<&(dyn Fn(f64, f64) -> String + Send + Sync)>) -> SceneSnapshot {
        let sources = match &self.mode {
            ScenarioMode::Single { source, .. } => vec![SourceSnapshot::from(source)],
            ScenarioMode::Multi { scheduler } => scheduler
                .active_sources()
                .map(|s| SourceSnapshot::from(&s.source))
                .collect(),
        };
        let stations = self
            .stations
            .stations()
            .iter()
            .map(|s| StationSnapshot {
                id: s.info.id,
                lat: s.info.lat,
                lon: s.info.lon,
                intensity: s.intensity,
                is_s_dominant: s.s_dominant,
                p_arrived: s.p_arrived,
                s_arrived: s.s_arrived,
                p_arrival_time: s.p_arrival_time,
            })
            .collect();
        let eew_estimate = match &self.mode {
            ScenarioMode::Single { tracker, .. } => Some(tracker.estimate()),
            ScenarioMode::Multi { .. } => None,
        };
        let epicenter_name = namer.and_then(|lookup| {
            sources
                .first()
                .map(|s: &SourceSnapshot| lookup(s.lat, s.lon))
        });
        SceneSnapshot {
            scenario_time: self.time,
            sources,
            stations,
            region_max: self.region_max.by_code.clone(),
            overall_max: self.region_max.overall_max,
            overall_max_region_name: self.region_max.overall_max_region.clone(),
            eew_estimate,
            epicenter_name,
        }
    }
}

impl From<&PointSource> for SourceSnapshot {
    fn from(source: &PointSource) -> Self {
        Self {
            lat: source.lat,
            lon: source.lon,
            depth_km: source.depth_km,
            magnitude: source.magnitude,
            p_radius_km: source.p_wave_radius_km(),
            s_radius_km: source.s_wave_radius_km(),
            elapsed: source.time,
        }
    }
}
