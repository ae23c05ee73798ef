//! Multi-source rupture scheduling.
//!
//! A rupture is a set of point sources strung along a fault polyline. Each
//! source is projected onto the polyline, ordered by arc length, and given
//! an activation delay from the start source, the rupture direction, and
//! the rupture velocity. Once a source activates it stays active and its
//! embedded clock runs at scenario rate.

use std::str::FromStr;

use crate::intensity::SiteEnvelope;
use crate::projection::latlon_to_xy_km;
use crate::source::PointSource;

/// Default rupture propagation speed (km/s).
pub const DEFAULT_RUPTURE_VELOCITY: f64 = 2.5;

/// Segments shorter than this are treated as degenerate and skipped.
const MIN_SEGMENT_KM2: f64 = 1e-9;

/// Which way the rupture propagates from the start source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
    Both,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Both => "both",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            "both" => Ok(Self::Both),
            _ => Err(format!(
                "unknown rupture direction: {s} (expected: forward, backward, both)"
            )),
        }
    }
}

/// Hypocenter parameters for one rupture segment source.
#[derive(Debug, Clone, Copy)]
pub struct SourceSpec {
    pub lat: f64,
    pub lon: f64,
    pub depth_km: f64,
    pub magnitude: f64,
}

/// A point source with its rupture scheduling state.
#[derive(Debug, Clone)]
pub struct RuptureSource {
    pub source: PointSource,
    /// Arc length from the polyline origin to this source's projection (km).
    /// In degraded mode (no usable polyline) this holds the raw longitude.
    pub distance_on_fault: f64,
    /// Scenario time at which this source activates; `None` means never.
    pub activate_at: Option<f64>,
    pub active: bool,
    input_index: usize,
}

/// Piecewise-linear rupture path with precomputed km-plane geometry.
#[derive(Debug, Clone)]
pub struct FaultPolyline {
    km_points: Vec<(f64, f64)>,
    cumulative_km: Vec<f64>,
}

impl FaultPolyline {
    #[must_use]
    pub fn new(vertices: &[(f64, f64)]) -> Self {
        let km_points: Vec<(f64, f64)> = vertices
            .iter()
            .map(|&(lat, lon)| latlon_to_xy_km(lat, lon))
            .collect();
        let mut cumulative_km = vec![0.0];
        for window in km_points.windows(2) {
            let (x0, y0) = window[0];
            let (x1, y1) = window[1];
            let last = cumulative_km[cumulative_km.len() - 1];
            cumulative_km.push(last + (x1 - x0).hypot(y1 - y0));
        }
        Self {
            km_points,
            cumulative_km,
        }
    }

    /// A usable rupture path needs at least one segment.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.km_points.len() >= 2
    }

    /// Total arc length in km.
    #[must_use]
    pub fn length_km(&self) -> f64 {
        self.cumulative_km.last().copied().unwrap_or(0.0)
    }

    /// Arc length from vertex 0 to the closest point on the polyline.
    #[must_use]
    pub fn distance_on_fault(&self, lat: f64, lon: f64) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        let (px, py) = latlon_to_xy_km(lat, lon);
        let mut best_dist = 0.0;
        let mut best_d2 = f64::INFINITY;
        for i in 0..self.km_points.len() - 1 {
            let (x0, y0) = self.km_points[i];
            let (x1, y1) = self.km_points[i + 1];
            let (vx, vy) = (x1 - x0, y1 - y0);
            let seg_len2 = vx * vx + vy * vy;
            if seg_len2 <= MIN_SEGMENT_KM2 {
                continue;
            }
            let t = (((px - x0) * vx + (py - y0) * vy) / seg_len2).clamp(0.0, 1.0);
            let (proj_x, proj_y) = (x0 + t * vx, y0 + t * vy);
            let d2 = (proj_x - px).powi(2) + (proj_y - py).powi(2);
            if d2 < best_d2 {
                best_d2 = d2;
                best_dist = self.cumulative_km[i] + (proj_x - x0).hypot(proj_y - y0);
            }
        }
        best_dist
    }
}

/// Orders sources along the fault, schedules their activation, and
/// aggregates their envelopes per site.
#[derive(Debug, Clone)]
pub struct RuptureScheduler {
    polyline: FaultPolyline,
    sources: Vec<RuptureSource>,
    direction: Direction,
    rupture_velocity: f64,
    pub time: f64,
}

impl RuptureScheduler {
    /// Build a scheduler and assign activation times.
    ///
    /// `start_index` refers to the order sources were passed in, not the
    /// fault ordering. Callers validate inputs; the scheduler itself
    /// tolerates an empty source list (it becomes a no-op) and a degenerate
    /// polyline (sources fall back to longitude ordering).
    #[must_use]
    pub fn new(
        polyline: FaultPolyline,
        specs: &[SourceSpec],
        start_index: usize,
        direction: Direction,
        rupture_velocity: f64,
    ) -> Self {
        let sources = specs
            .iter()
            .enumerate()
            .map(|(input_index, spec)| RuptureSource {
                source: PointSource::new(spec.lat, spec.lon, spec.depth_km, spec.magnitude),
                distance_on_fault: 0.0,
                activate_at: None,
                active: false,
                input_index,
            })
            .collect();
        let mut scheduler = Self {
            polyline,
            sources,
            direction,
            rupture_velocity,
            time: 0.0,
        };
        scheduler.assign_activation_times(start_index);
        scheduler
    }

    /// Project, order, and assign per-source activation delays.
    fn assign_activation_times(&mut self, start_index: usize) {
        if self.sources.is_empty() {
            return;
        }
        for src in &mut self.sources {
            src.distance_on_fault = if self.polyline.is_valid() {
                self.polyline.distance_on_fault(src.source.lat, src.source.lon)
            } else {
                // degraded: approximate an east-west rupture by longitude
                src.source.lon
            };
            src.active = false;
            src.source.time = 0.0;
        }
        // stable sort keeps input order on ties
        self.sources
            .sort_by(|a, b| a.distance_on_fault.total_cmp(&b.distance_on_fault));

        let start_dist = self
            .sources
            .iter()
            .find(|s| s.input_index == start_index)
            .map_or_else(|| self.sources[0].distance_on_fault, |s| s.distance_on_fault);

        for src in &mut self.sources {
            if src.input_index == start_index {
                src.activate_at = Some(0.0);
                continue;
            }
            let dist = src.distance_on_fault;
            src.activate_at = match self.direction {
                Direction::Forward => {
                    if dist < start_dist {
                        None
                    } else {
                        Some((dist - start_dist) / self.rupture_velocity)
                    }
                }
                Direction::Backward => {
                    if dist > start_dist {
                        None
                    } else {
                        Some((start_dist - dist) / self.rupture_velocity)
                    }
                }
                Direction::Both => Some((dist - start_dist).abs() / self.rupture_velocity),
            };
        }
    }

    /// Advance scenario time and run activation/clock bookkeeping.
    ///
    /// A source activating mid-tick starts its clock at the overshoot
    /// (`time - activate_at`), so late activations are not quantized to the
    /// tick grid. Sources never deactivate within a scenario.
    pub fn update(&mut self, dt: f64) {
        self.time += dt;
        for src in &mut self.sources {
            let Some(activate_at) = src.activate_at else {
                continue;
            };
            if self.time >= activate_at {
                if src.active {
                    src.source.advance(dt);
                } else {
                    src.active = true;
                    src.source.time = self.time - activate_at;
                }
            }
        }
    }

    /// Sources in fault order.
    #[must_use]
    pub fn sources(&self) -> &[RuptureSource] {
        &self.sources
    }

    /// Currently active sources in fault order.
    pub fn active_sources(&self) -> impl Iterator<Item = &RuptureSource> {
        self.sources.iter().filter(|s| s.active)
    }

    /// Largest source magnitude, used for report pacing.
    #[must_use]
    pub fn max_magnitude(&self) -> f64 {
        self.sources
            .iter()
            .map(|s| s.source.magnitude)
            .fold(0.0, f64::max)
    }

    /// Pointwise-maximum envelope over all active sources at a site.
    ///
    /// Returns `(intensity, s_dominant)` for the source supplying the max.
    #[must_use]
    pub fn calc_intensity(&self, lat: f64, lon: f64, amp: f64) -> (f64, bool) {
        let mut max_value = 0.0;
        let mut max_is_s = false;
        for src in self.active_sources() {
            let envelope = SiteEnvelope::new(&src.source, lat, lon, amp);
            let (value, is_s) = envelope.value_at(src.source.time);
            if value > max_value {
                max_value = value;
                max_is_s = is_s;
            }
        }
        (max_value, max_is_s)
    }

    /// Magnitude of the active source contributing the strongest envelope
    /// at a site, if any wave has reached it.
    #[must_use]
    pub fn governing_magnitude(&self, lat: f64, lon: f64, amp: f64) -> Option<f64> {
        let mut best: Option<(f64, f64)> = None;
        for src in self.active_sources() {
            let envelope = SiteEnvelope::new(&src.source, lat, lon, amp);
            let (value, _) = envelope.value_at(src.source.time);
            if best.is_none_or(|(v, _)| value > v) {
                best = Some((value, src.source.magnitude));
            }
        }
        best.map(|(_, m)| m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::xy_km_to_latlon;

    fn three_sources_on_line() -> (Vec<(f64, f64)>, Vec<SourceSpec>, f64) {
        let a = (35.0, 139.0);
        let b = (36.0, 140.0);
        // midpoint taken in the km-plane so it projects to exactly L/2
        let (ax, ay) = latlon_to_xy_km(a.0, a.1);
        let (bx, by) = latlon_to_xy_km(b.0, b.1);
        let mid = xy_km_to_latlon((ax + bx) / 2.0, (ay + by) / 2.0);
        let length = (bx - ax).hypot(by - ay);
        let spec = |p: (f64, f64)| SourceSpec {
            lat: p.0,
            lon: p.1,
            depth_km: 10.0,
            magnitude: 7.0,
        };
        (vec![a, b], vec![spec(a), spec(mid), spec(b)], length)
    }

    #[test]
    fn test_polyline_length_and_projection() {
        let (vertices, _, length) = three_sources_on_line();
        let polyline = FaultPolyline::new(&vertices);
        assert!(polyline.is_valid());
        assert!((polyline.length_km() - length).abs() < 1e-9);
        assert!(polyline.distance_on_fault(35.0, 139.0).abs() < 1e-9);
        assert!((polyline.distance_on_fault(36.0, 140.0) - length).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_segment_skipped() {
        let polyline = FaultPolyline::new(&[(35.0, 139.0), (35.0, 139.0), (36.0, 140.0)]);
        let full = polyline.length_km();
        assert!(full > 0.0);
        // projection still works across the zero-length segment
        let d = polyline.distance_on_fault(36.0, 140.0);
        assert!((d - full).abs() < 1e-9);
    }

    #[test]
    fn test_forward_activation_times() {
        let (vertices, specs, length) = three_sources_on_line();
        let scheduler = RuptureScheduler::new(
            FaultPolyline::new(&vertices),
            &specs,
            0,
            Direction::Forward,
            DEFAULT_RUPTURE_VELOCITY,
        );
        let times: Vec<f64> = scheduler
            .sources()
            .iter()
            .map(|s| s.activate_at.unwrap_or(f64::NAN))
            .collect();
        assert!((times[0] - 0.0).abs() < 1e-9);
        assert!((times[1] - length / 2.0 / 2.5).abs() < 1e-6);
        assert!((times[2] - length / 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_forward_activation_boundary() {
        let (vertices, specs, length) = three_sources_on_line();
        let mut scheduler = RuptureScheduler::new(
            FaultPolyline::new(&vertices),
            &specs,
            0,
            Direction::Forward,
            2.5,
        );
        let t_mid = length / 2.0 / 2.5;
        let eps = 1e-4;
        scheduler.update(t_mid - eps);
        assert!(scheduler.sources()[0].active);
        assert!(!scheduler.sources()[1].active);
        scheduler.update(2.0 * eps);
        assert!(scheduler.sources()[1].active);
        // clock starts at the overshoot, not at a full tick
        assert!(scheduler.sources()[1].source.time <= 2.0 * eps + 1e-12);
    }

    #[test]
    fn test_forward_never_activates_behind_start() {
        let (vertices, specs, _) = three_sources_on_line();
        let mut scheduler = RuptureScheduler::new(
            FaultPolyline::new(&vertices),
            &specs,
            1,
            Direction::Forward,
            2.5,
        );
        scheduler.update(1e6);
        let behind = scheduler
            .sources()
            .iter()
            .find(|s| s.distance_on_fault < scheduler.sources()[1].distance_on_fault)
            .map(|s| s.active);
        assert_eq!(behind, Some(false));
    }

    #[test]
    fn test_backward_mirrors_forward() {
        let (vertices, specs, length) = three_sources_on_line();
        let scheduler = RuptureScheduler::new(
            FaultPolyline::new(&vertices),
            &specs,
            2,
            Direction::Backward,
            2.5,
        );
        let times: Vec<f64> = scheduler
            .sources()
            .iter()
            .map(|s| s.activate_at.unwrap_or(f64::NAN))
            .collect();
        assert!((times[0] - length / 2.5).abs() < 1e-6);
        assert!((times[1] - length / 2.0 / 2.5).abs() < 1e-6);
        assert!((times[2] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_both_from_middle() {
        let (vertices, specs, length) = three_sources_on_line();
        let scheduler =
            RuptureScheduler::new(FaultPolyline::new(&vertices), &specs, 1, Direction::Both, 2.5);
        let times: Vec<f64> = scheduler
            .sources()
            .iter()
            .map(|s| s.activate_at.unwrap_or(f64::NAN))
            .collect();
        assert!((times[0] - length / 2.0 / 2.5).abs() < 1e-6);
        assert!((times[1] - 0.0).abs() < 1e-9);
        assert!((times[2] - length / 2.0 / 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_single_source_matches_point_source() {
        // one source at the start, direction both: equivalent to single mode
        let spec = SourceSpec {
            lat: 35.7,
            lon: 139.7,
            depth_km: 10.0,
            magnitude: 6.0,
        };
        let mut scheduler = RuptureScheduler::new(
            FaultPolyline::new(&[(35.0, 139.0), (36.0, 140.0)]),
            &[spec],
            0,
            Direction::Both,
            2.5,
        );
        assert_eq!(scheduler.sources()[0].activate_at, Some(0.0));
        scheduler.update(10.0);

        let mut reference = PointSource::new(35.7, 139.7, 10.0, 6.0);
        reference.advance(10.0);
        let envelope = SiteEnvelope::new(&reference, 35.7, 139.7, 1.0);
        let (expected, expected_s) = envelope.value_at(reference.time);
        let (got, got_s) = scheduler.calc_intensity(35.7, 139.7, 1.0);
        assert!((got - expected).abs() < 1e-9);
        assert_eq!(got_s, expected_s);
    }

    #[test]
    fn test_degraded_mode_orders_by_longitude() {
        let specs = [
            SourceSpec {
                lat: 35.0,
                lon: 141.0,
                depth_km: 10.0,
                magnitude: 6.0,
            },
            SourceSpec {
                lat: 35.0,
                lon: 139.0,
                depth_km: 10.0,
                magnitude: 6.0,
            },
        ];
        let scheduler = RuptureScheduler::new(
            FaultPolyline::new(&[]),
            &specs,
            1,
            Direction::Forward,
            2.5,
        );
        assert!((scheduler.sources()[0].distance_on_fault - 139.0).abs() < 1e-12);
        assert!((scheduler.sources()[1].distance_on_fault - 141.0).abs() < 1e-12);
    }

    #[test]
    fn test_tie_break_is_stable() {
        let spec = SourceSpec {
            lat: 35.5,
            lon: 139.5,
            depth_km: 10.0,
            magnitude: 6.0,
        };
        let scheduler = RuptureScheduler::new(
            FaultPolyline::new(&[(35.0, 139.0), (36.0, 140.0)]),
            &[spec, spec, spec],
            0,
            Direction::Forward,
            2.5,
        );
        let order: Vec<usize> = scheduler.sources().iter().map(|s| s.input_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_sources_noop() {
        let mut scheduler = RuptureScheduler::new(
            FaultPolyline::new(&[(35.0, 139.0), (36.0, 140.0)]),
            &[],
            0,
            Direction::Forward,
            2.5,
        );
        scheduler.update(5.0);
        assert_eq!(scheduler.active_sources().count(), 0);
        let (value, _) = scheduler.calc_intensity(35.5, 139.5, 1.0);
        assert!((value - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("forward".parse::<Direction>(), Ok(Direction::Forward));
        assert_eq!("BOTH".parse::<Direction>(), Ok(Direction::Both));
        assert!("sideways".parse::<Direction>().is_err());
    }
}
