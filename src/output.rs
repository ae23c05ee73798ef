//! Output formatters for simulation frames.
//!
//! Supports human-readable (with colors), JSON, and NDJSON formats.
//! Human output only prints frames that carry an event; machine formats
//! emit one record per frame.

use std::io::{self, Write};

use serde::Serialize;

use crate::engine::{FrameReport, SceneSnapshot};
use crate::intensity::JmaScale;

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

// Shindo band colors, following the JMA palette
const BLUE: &str = "\x1b[94m"; // 1-2
const GREEN: &str = "\x1b[92m"; // 3
const YELLOW: &str = "\x1b[93m"; // 4
const ORANGE: &str = "\x1b[38;5;208m"; // 5-, 5+
const RED: &str = "\x1b[91m"; // 6-, 6+
const MAGENTA: &str = "\x1b[95m"; // 7
const WHITE: &str = "\x1b[97m";

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// Pretty-printed JSON
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!("unknown format: {s} (expected: human, json, ndjson)")),
        }
    }
}

/// Color for a continuous intensity value.
fn intensity_color(intensity: f64) -> &'static str {
    match JmaScale::from_intensity(intensity) {
        JmaScale::None => WHITE,
        JmaScale::One | JmaScale::Two => BLUE,
        JmaScale::Three => GREEN,
        JmaScale::Four => YELLOW,
        JmaScale::FiveLower | JmaScale::FiveUpper => ORANGE,
        JmaScale::SixLower | JmaScale::SixUpper => RED,
        JmaScale::Seven => MAGENTA,
    }
}

/// One frame flattened for machine output.
#[derive(Debug, Serialize)]
struct FrameRecord<'a> {
    timestamp: String,
    report: &'a FrameReport,
    overall_max: f64,
    overall_max_region: &'a str,
}

impl<'a> FrameRecord<'a> {
    fn new(report: &'a FrameReport, snapshot: &'a SceneSnapshot) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            report,
            overall_max: snapshot.overall_max,
            overall_max_region: &snapshot.overall_max_region_name,
        }
    }
}

/// Whether a frame carries anything worth a human line.
#[must_use]
pub fn is_notable(report: &FrameReport) -> bool {
    !report.new_intensity_levels.is_empty()
        || report.revision.is_some()
        || report.final_report
}

/// Write one frame in the selected format.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_frame<W: Write>(
    writer: &mut W,
    report: &FrameReport,
    snapshot: &SceneSnapshot,
    format: Format,
) -> io::Result<()> {
    match format {
        Format::Human => write_frame_human(writer, report, snapshot),
        Format::Json | Format::Ndjson => {
            let record = FrameRecord::new(report, snapshot);
            let json = serde_json::to_string(&record)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{json}")
        }
    }
}

fn write_frame_human<W: Write>(
    writer: &mut W,
    report: &FrameReport,
    snapshot: &SceneSnapshot,
) -> io::Result<()> {
    if !is_notable(report) {
        return Ok(());
    }

    let t = report.scenario_time;

    for level in &report.new_intensity_levels {
        let color = intensity_color(f64::from(*level));
        writeln!(
            writer,
            "{DIM}t={t:7.1}s{RESET} │ {color}{BOLD}shindo {level}{RESET} observed for the first time"
        )?;
    }

    if let Some(revision) = &report.revision {
        let est = &revision.new_estimate;
        let tag = if revision.overthrown {
            format!("{RED}{BOLD}OVERTHROWN{RESET}")
        } else {
            format!("{YELLOW}revision{RESET}")
        };
        writeln!(
            writer,
            "{DIM}t={t:7.1}s{RESET} │ EEW {tag} #{count}: ({lat:.2}, {lon:.2}) {depth:.0}km M{mag:.1}{conv}",
            count = revision.count,
            lat = est.lat,
            lon = est.lon,
            depth = est.depth_km,
            mag = est.magnitude,
            conv = if est.converged {
                " (converged)"
            } else {
                ""
            },
        )?;
    }

    if report.final_report {
        let color = intensity_color(snapshot.overall_max);
        writeln!(
            writer,
            "{DIM}t={t:7.1}s{RESET} │ {BOLD}FINAL REPORT{RESET}: max {color}{label}{RESET} in {region}",
            label = JmaScale::from_intensity(snapshot.overall_max).as_str(),
            region = if snapshot.overall_max_region_name.is_empty() {
                "-"
            } else {
                &snapshot.overall_max_region_name
            },
        )?;
    }

    Ok(())
}

/// Write an end-of-run scene summary.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_summary<W: Write>(
    writer: &mut W,
    snapshot: &SceneSnapshot,
    format: Format,
) -> io::Result<()> {
    match format {
        Format::Human => write_summary_human(writer, snapshot),
        Format::Json => {
            let json = serde_json::to_string_pretty(snapshot)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{json}")
        }
        Format::Ndjson => {
            let json = serde_json::to_string(snapshot)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{json}")
        }
    }
}

fn write_summary_human<W: Write>(writer: &mut W, snapshot: &SceneSnapshot) -> io::Result<()> {
    writeln!(
        writer,
        "{BOLD}── scene at t={:.1}s ──{RESET}",
        snapshot.scenario_time
    )?;
    for source in &snapshot.sources {
        writeln!(
            writer,
            "  source ({:.2}, {:.2}) {:.0}km M{:.1} │ P {:.0}km S {:.0}km │ {:.1}s elapsed",
            source.lat,
            source.lon,
            source.depth_km,
            source.magnitude,
            source.p_radius_km,
            source.s_radius_km,
            source.elapsed
        )?;
    }

    if let Some(name) = &snapshot.epicenter_name {
        writeln!(writer, "  epicenter: {name}")?;
    }

    let triggered = snapshot
        .stations
        .iter()
        .filter(|s| s.intensity >= 0.5)
        .count();
    let color = intensity_color(snapshot.overall_max);
    writeln!(
        writer,
        "  stations triggered: {triggered}/{} │ max {color}{}{RESET} {}",
        snapshot.stations.len(),
        JmaScale::from_intensity(snapshot.overall_max).as_str(),
        snapshot.overall_max_region_name
    )?;

    for (code, value) in &snapshot.region_max {
        let color = intensity_color(*value);
        writeln!(
            writer,
            "    region {code}: {color}{}{RESET} ({value:.1})",
            JmaScale::from_intensity(*value).as_str()
        )?;
    }

    if let Some(est) = &snapshot.eew_estimate {
        writeln!(
            writer,
            "  EEW estimate: ({:.2}, {:.2}) {:.0}km M{:.1} │ {} revisions{}",
            est.lat,
            est.lon,
            est.depth_km,
            est.magnitude,
            est.revisions,
            if est.converged { " │ converged" } else { "" }
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_format_parse() {
        assert_eq!("human".parse::<Format>().unwrap(), Format::Human);
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("ndjson".parse::<Format>().unwrap(), Format::Ndjson);
        assert!("invalid".parse::<Format>().is_err());
    }

    fn quiet_report() -> FrameReport {
        FrameReport {
            scenario_time: 1.0,
            new_intensity_levels: BTreeSet::new(),
            revision: None,
            final_report: false,
            station_detections_delta: 0,
        }
    }

    fn empty_snapshot() -> SceneSnapshot {
        SceneSnapshot {
            scenario_time: 1.0,
            sources: vec![],
            stations: vec![],
            region_max: std::collections::BTreeMap::new(),
            overall_max: 0.0,
            overall_max_region_name: String::new(),
            eew_estimate: None,
            epicenter_name: None,
        }
    }

    #[test]
    fn test_quiet_frame_prints_nothing_for_humans() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &quiet_report(), &empty_snapshot(), Format::Human).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_ndjson_frame_always_emits() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &quiet_report(), &empty_snapshot(), Format::Ndjson).unwrap();
        let line = String::from_utf8(buffer).unwrap();
        assert!(line.contains("\"scenario_time\""));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_new_level_prints_line() {
        let mut report = quiet_report();
        report.new_intensity_levels.insert(4);
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &report, &empty_snapshot(), Format::Human).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("shindo 4"));
    }

    #[test]
    fn test_summary_serializes() {
        let mut buffer = Vec::new();
        write_summary(&mut buffer, &empty_snapshot(), Format::Json).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("\"stations\": []"));
    }
}
