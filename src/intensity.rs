//! JMA intensity kernel.
//!
//! Pure functions: peak intensity at a site from magnitude, depth and
//! epicentral distance; the time-dependent P/S attack-plateau-decay
//! envelope; and the mapping from continuous intensity to the JMA label
//! scale (1 .. 7 with the split 5/6 bands).
//!
//! Peak estimation goes through instrumental intensity,
//! `I = 2*log10(a) + 0.94`, over a log-linear acceleration attenuation.
//! Site response enters as `bai`, a quadratic blend of the station
//! amplification factor, multiplying the acceleration.

use crate::source::PointSource;

/// Continuous intensity never exceeds this cap.
pub const INTENSITY_CAP: f64 = 7.5;

/// P-envelope rise time constant (s).
pub const TAU_P_RISE: f64 = 0.5;

/// P-envelope decay time constant (s).
pub const TAU_P_DECAY: f64 = 8.0;

/// S-envelope rise time constant (s).
pub const TAU_S_RISE: f64 = 0.8;

/// Convert a station amplification factor into the `bai` site term.
#[must_use]
pub fn site_bai(amp: f64) -> f64 {
    let amp = amp.max(0.01);
    (amp * 4.0 + amp * amp) / 5.0
}

/// Peak JMA intensity of the S phase at a site.
///
/// Returns the raw value, which is negative for signals too weak to
/// register; callers clamp as appropriate for their context.
#[must_use]
pub fn jma_intensity(magnitude: f64, depth_km: f64, epicentral_km: f64, bai: f64) -> f64 {
    let r = epicentral_km.hypot(depth_km).max(1.0);
    let bai = bai.max(0.01);
    // peak ground acceleration in gal, log-linear attenuation
    let log_accel = 0.5 * magnitude - r.log10() - 0.0011 * r + 0.19;
    let shindo = 2.0 * (log_accel + bai.log10()) + 0.94;
    shindo.min(INTENSITY_CAP)
}

/// Peak intensity carried by the P phase: 1.5 units below the S peak.
#[must_use]
pub fn p_peak(s_peak: f64) -> f64 {
    (s_peak - 1.5).max(0.0)
}

/// Seconds the S envelope holds its peak before decaying.
#[must_use]
pub fn plateau_secs(magnitude: f64) -> f64 {
    2.0 * 2.0_f64.powf(magnitude - 6.0)
}

/// S-phase decay time constant from an empirical significant-duration
/// (D5-95) analogue, clamped to [2, 40] s.
#[must_use]
pub fn s_decay_tau(magnitude: f64, epicentral_km: f64, amp: f64) -> f64 {
    let mag_base = 4.0 * 2.0_f64.powf(magnitude - 5.0);
    let dist_factor = 1.0 + 0.1 * ((epicentral_km + 10.0) / 10.0).log10();
    let vs30 = 400.0 / amp.max(0.1);
    let site_factor = if vs30 >= 400.0 {
        1.0
    } else if vs30 >= 200.0 {
        1.3
    } else {
        1.8
    };
    let d5_95 = mag_base * dist_factor * site_factor;
    (d5_95 / 3.5).clamp(2.0, 40.0)
}

fn attack(x: f64, tau: f64) -> f64 {
    if x > 0.0 { 1.0 - (-x / tau).exp() } else { 0.0 }
}

fn decay(x: f64, tau: f64) -> f64 {
    if x > 0.0 { (-x / tau).exp() } else { 0.0 }
}

/// Precomputed envelope of one source as seen from one site.
///
/// Construction does the geometry and peak estimation once; evaluation at a
/// given elapsed time is then a handful of exponentials.
#[derive(Debug, Clone)]
pub struct SiteEnvelope {
    s_peak: f64,
    p_peak: f64,
    t_p_arrival: f64,
    t_s_arrival: f64,
    plateau: f64,
    tau_s: f64,
}

impl SiteEnvelope {
    /// Build the envelope for `source` as observed at (lat, lon) with site
    /// amplification `amp`.
    #[must_use]
    pub fn new(source: &PointSource, lat: f64, lon: f64, amp: f64) -> Self {
        let d_epi = source.epicentral_distance_km(lat, lon);
        let s_peak = jma_intensity(source.magnitude, source.depth_km, d_epi, site_bai(amp)).max(0.0);
        Self {
            s_peak,
            p_peak: p_peak(s_peak),
            t_p_arrival: source.p_arrival_time(lat, lon),
            t_s_arrival: source.s_arrival_time(lat, lon),
            plateau: plateau_secs(source.magnitude),
            tau_s: s_decay_tau(source.magnitude, d_epi, amp),
        }
    }

    /// Envelope value at `t` seconds after the source activated.
    ///
    /// Returns `(intensity, s_dominant)`; `s_dominant` tells whether the S
    /// branch supplied the maximum.
    #[must_use]
    pub fn value_at(&self, t: f64) -> (f64, bool) {
        let dt_p = t - self.t_p_arrival;
        let dt_s = t - self.t_s_arrival;

        let p_env = self.p_peak * attack(dt_p, TAU_P_RISE) * decay(dt_p, TAU_P_DECAY);

        let s_env = if dt_s <= 0.0 {
            0.0
        } else if dt_s <= self.plateau {
            self.s_peak * attack(dt_s, TAU_S_RISE)
        } else {
            self.s_peak * decay(dt_s - self.plateau, self.tau_s)
        };

        if dt_s > 0.0 && s_env >= p_env {
            (s_env, true)
        } else {
            (p_env, false)
        }
    }

    #[must_use]
    pub fn s_peak(&self) -> f64 {
        self.s_peak
    }
}

// ============================================================================
// JMA label scale
// ============================================================================

/// The ten JMA shindo bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JmaScale {
    None,
    One,
    Two,
    Three,
    Four,
    FiveLower,
    FiveUpper,
    SixLower,
    SixUpper,
    Seven,
}

impl JmaScale {
    /// Band for a continuous intensity value (canonical cutpoints).
    #[must_use]
    pub fn from_intensity(intensity: f64) -> Self {
        match intensity {
            i if i < 0.5 => Self::None,
            i if i < 1.5 => Self::One,
            i if i < 2.5 => Self::Two,
            i if i < 3.5 => Self::Three,
            i if i < 4.5 => Self::Four,
            i if i < 5.0 => Self::FiveLower,
            i if i < 5.5 => Self::FiveUpper,
            i if i < 6.0 => Self::SixLower,
            i if i < 6.5 => Self::SixUpper,
            _ => Self::Seven,
        }
    }

    /// JMA label text; empty for sub-threshold values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::One => "1",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::FiveLower => "5-",
            Self::FiveUpper => "5+",
            Self::SixLower => "6-",
            Self::SixUpper => "6+",
            Self::Seven => "7",
        }
    }

    /// Integer major level 1..=7 (both 5-bands map to 5, both 6-bands to 6).
    #[must_use]
    pub const fn major_level(self) -> Option<u8> {
        match self {
            Self::None => None,
            Self::One => Some(1),
            Self::Two => Some(2),
            Self::Three => Some(3),
            Self::Four => Some(4),
            Self::FiveLower | Self::FiveUpper => Some(5),
            Self::SixLower | Self::SixUpper => Some(6),
            Self::Seven => Some(7),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bai_identity_at_unit_amp() {
        assert!((site_bai(1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bai_quadratic_blend() {
        // (2*4 + 4) / 5 = 2.4
        assert!((site_bai(2.0) - 2.4).abs() < 1e-12);
    }

    #[test]
    fn test_p_peak_offset() {
        assert!((p_peak(5.0) - 3.5).abs() < 1e-12);
        assert!((p_peak(1.0) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_peak_m6_near_field() {
        // M6 at 10 km depth, co-located site: just above 5
        let i = jma_intensity(6.0, 10.0, 0.0, 1.0);
        assert!(i > 5.0 && i < 5.6, "got {i}");
    }

    #[test]
    fn test_peak_m9_reaches_seven() {
        let i = jma_intensity(9.0, 10.0, 0.0, 1.0);
        assert!(i >= 6.5, "got {i}");
        assert_eq!(JmaScale::from_intensity(i), JmaScale::Seven);
        assert!(i <= INTENSITY_CAP);
    }

    #[test]
    fn test_weak_event_stays_negative() {
        let i = jma_intensity(1.0, 10.0, 500.0, 1.0);
        assert!(i < 0.0, "got {i}");
    }

    #[test]
    fn test_plateau_doubles_per_magnitude() {
        assert!((plateau_secs(6.0) - 2.0).abs() < 1e-12);
        assert!((plateau_secs(7.0) - 4.0).abs() < 1e-12);
        assert!((plateau_secs(9.0) - 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_s_decay_tau_m7_at_100km() {
        // D5-95 = 16 * (1 + 0.1*log10(11)) * 1.0, tau = D/3.5
        let tau = s_decay_tau(7.0, 100.0, 1.0);
        assert!((2.0..=40.0).contains(&tau));
        assert!((tau - 16.0 * (1.0 + 0.1 * 11.0_f64.log10()) / 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_s_decay_tau_clamped() {
        assert!((s_decay_tau(1.0, 0.0, 1.0) - 2.0).abs() < 1e-12);
        assert!((s_decay_tau(9.5, 500.0, 3.0) - 40.0).abs() < 1e-12);
    }

    #[test]
    fn test_envelope_silent_before_p() {
        let mut eq = PointSource::new(35.7, 139.7, 10.0, 6.0);
        eq.advance(0.1);
        let env = SiteEnvelope::new(&eq, 35.7, 139.7, 1.0);
        let (v, _) = env.value_at(eq.time);
        assert!((v - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_envelope_p_phase_then_s_phase() {
        let eq = PointSource::new(35.7, 139.7, 10.0, 6.0);
        let env = SiteEnvelope::new(&eq, 35.7, 139.7, 1.0);
        // P arrives at 10/6.5 ~ 1.54 s, S at 2.5 s
        let (v_p, s_dom_p) = env.value_at(2.0);
        assert!(v_p > 0.0);
        assert!(!s_dom_p);
        let (v_s, s_dom_s) = env.value_at(4.0);
        assert!(s_dom_s);
        assert!(v_s > v_p);
    }

    #[test]
    fn test_envelope_decays_after_plateau() {
        let eq = PointSource::new(35.7, 139.7, 10.0, 6.0);
        let env = SiteEnvelope::new(&eq, 35.7, 139.7, 1.0);
        let s_arrival = 10.0 / 4.0;
        let plateau_end = s_arrival + plateau_secs(6.0);
        let (at_end, _) = env.value_at(plateau_end);
        let (later, _) = env.value_at(plateau_end + 30.0);
        assert!(later < at_end);
        assert!(later >= 0.0);
    }

    #[test]
    fn test_envelope_m1_far_field_below_display_threshold() {
        // ~500 km east of the source on the km-plane
        let eq = PointSource::new(37.0, 138.0, 10.0, 1.0);
        let env = SiteEnvelope::new(&eq, 37.0, 143.6, 1.0);
        let mut t = 0.0;
        while t < 300.0 {
            let (v, _) = env.value_at(t);
            assert!(v < 0.5, "envelope {v} at t={t}");
            t += 1.0;
        }
    }

    #[test]
    fn test_envelope_m9_near_field_reaches_seven() {
        let eq = PointSource::new(38.0, 142.0, 10.0, 9.0);
        let env = SiteEnvelope::new(&eq, 38.0, 142.0, 1.0);
        let s_arrival = 10.0 / 4.0;
        let (v, s_dom) = env.value_at(s_arrival + plateau_secs(9.0));
        assert!(s_dom);
        assert_eq!(JmaScale::from_intensity(v), JmaScale::Seven);
    }

    #[test]
    fn test_scale_cutpoints() {
        assert_eq!(JmaScale::from_intensity(0.49), JmaScale::None);
        assert_eq!(JmaScale::from_intensity(0.5), JmaScale::One);
        assert_eq!(JmaScale::from_intensity(2.0), JmaScale::Two);
        assert_eq!(JmaScale::from_intensity(4.49), JmaScale::Four);
        assert_eq!(JmaScale::from_intensity(4.5), JmaScale::FiveLower);
        assert_eq!(JmaScale::from_intensity(5.0), JmaScale::FiveUpper);
        assert_eq!(JmaScale::from_intensity(5.5), JmaScale::SixLower);
        assert_eq!(JmaScale::from_intensity(6.0), JmaScale::SixUpper);
        assert_eq!(JmaScale::from_intensity(6.5), JmaScale::Seven);
    }

    #[test]
    fn test_scale_labels_and_levels() {
        assert_eq!(JmaScale::FiveLower.as_str(), "5-");
        assert_eq!(JmaScale::SixUpper.as_str(), "6+");
        assert_eq!(JmaScale::FiveUpper.major_level(), Some(5));
        assert_eq!(JmaScale::None.major_level(), None);
        assert_eq!(JmaScale::Seven.major_level(), Some(7));
    }
}
