//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::Format;
use crate::rupture::{DEFAULT_RUPTURE_VELOCITY, Direction, SourceSpec};

/// Japan-style EEW propagation and intensity simulator.
#[derive(Parser, Debug)]
#[command(name = "shindosim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate a single hypocenter
    Single(SingleArgs),

    /// Simulate a multi-source rupture along a fault polyline
    Multi(MultiArgs),

    /// Serve live snapshots over HTTP/SSE
    Serve(ServeArgs),
}

/// Options shared by the simulation commands.
#[derive(Parser, Debug)]
pub struct CommonArgs {
    /// Station list JSON file (array of {id, lat, lon, name?, amp?})
    #[arg(long)]
    pub stations: Option<PathBuf>,

    /// Region GeoJSON file (FeatureCollection of coded polygons)
    #[arg(long)]
    pub regions: Option<PathBuf>,

    /// Simulated seconds to run
    #[arg(long, default_value = "180")]
    pub duration: f64,

    /// Tick step in simulated seconds
    #[arg(long, default_value = "0.1")]
    pub tick: f64,

    /// Clock multiplier applied to every tick
    #[arg(long, default_value = "1.0")]
    pub time_scale: f64,

    /// RNG seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `single` command.
#[derive(Parser, Debug)]
pub struct SingleArgs {
    /// Epicenter latitude (degrees)
    #[arg(long)]
    pub lat: f64,

    /// Epicenter longitude (degrees)
    #[arg(long)]
    pub lon: f64,

    /// Hypocenter depth (km)
    #[arg(long, default_value = "10")]
    pub depth: f64,

    /// Magnitude (1.0 - 9.5)
    #[arg(long, short = 'm')]
    pub magnitude: f64,

    /// Disable the EEW revision tracker (waves start from truth)
    #[arg(long)]
    pub no_tracking: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for the `multi` command.
#[derive(Parser, Debug)]
pub struct MultiArgs {
    /// Fault polyline: "lat,lon;lat,lon;..."
    #[arg(long, value_parser = parse_polyline)]
    pub fault: PolylineArg,

    /// Rupture sources: "lat,lon,depth_km,magnitude;..."
    #[arg(long, value_parser = parse_sources)]
    pub sources: SourcesArg,

    /// Index of the source the rupture starts from
    #[arg(long, default_value = "0")]
    pub start: usize,

    /// Rupture direction along the fault
    #[arg(long, default_value = "forward", value_parser = parse_direction)]
    pub direction: Direction,

    /// Rupture velocity (km/s)
    #[arg(long, default_value_t = DEFAULT_RUPTURE_VELOCITY)]
    pub velocity: f64,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Wall-clock milliseconds between ticks
    #[arg(long, default_value = "100")]
    pub tick_ms: u64,

    /// Epicenter latitude (degrees)
    #[arg(long)]
    pub lat: f64,

    /// Epicenter longitude (degrees)
    #[arg(long)]
    pub lon: f64,

    /// Hypocenter depth (km)
    #[arg(long, default_value = "10")]
    pub depth: f64,

    /// Magnitude (1.0 - 9.5)
    #[arg(long, short = 'm')]
    pub magnitude: f64,

    /// Disable the EEW revision tracker
    #[arg(long)]
    pub no_tracking: bool,

    /// Clock multiplier applied to every tick
    #[arg(long, default_value = "1.0")]
    pub time_scale: f64,

    /// Station list JSON file
    #[arg(long)]
    pub stations: Option<PathBuf>,

    /// Region GeoJSON file
    #[arg(long)]
    pub regions: Option<PathBuf>,

    /// RNG seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
}

/// A parsed fault polyline.
#[derive(Debug, Clone)]
pub struct PolylineArg(pub Vec<(f64, f64)>);

/// A parsed rupture source list.
#[derive(Debug, Clone)]
pub struct SourcesArg(pub Vec<SourceSpec>);

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

/// Parse a rupture direction from string.
fn parse_direction(s: &str) -> Result<Direction, String> {
    s.parse()
}

/// Parse "lat,lon;lat,lon;..." into a polyline.
fn parse_polyline(s: &str) -> Result<PolylineArg, String> {
    let mut vertices = Vec::new();
    for (i, pair) in s.split(';').enumerate() {
        let parts: Vec<&str> = pair.split(',').collect();
        if parts.len() != 2 {
            return Err(format!(
                "vertex {i}: expected lat,lon, got '{pair}'"
            ));
        }
        let lat: f64 = parts[0]
            .trim()
            .parse()
            .map_err(|e| format!("vertex {i}: invalid lat: {e}"))?;
        let lon: f64 = parts[1]
            .trim()
            .parse()
            .map_err(|e| format!("vertex {i}: invalid lon: {e}"))?;
        vertices.push((lat, lon));
    }
    if vertices.len() < 2 {
        return Err(format!(
            "fault polyline needs at least 2 vertices, got {}",
            vertices.len()
        ));
    }
    Ok(PolylineArg(vertices))
}

/// Parse "lat,lon,depth_km,magnitude;..." into rupture sources.
fn parse_sources(s: &str) -> Result<SourcesArg, String> {
    let mut sources = Vec::new();
    for (i, item) in s.split(';').enumerate() {
        let parts: Vec<&str> = item.split(',').collect();
        if parts.len() != 4 {
            return Err(format!(
                "source {i}: expected lat,lon,depth,magnitude, got '{item}'"
            ));
        }
        let values: Result<Vec<f64>, _> = parts.iter().map(|p| p.trim().parse::<f64>()).collect();
        let values = values.map_err(|e| format!("source {i}: invalid number: {e}"))?;
        sources.push(SourceSpec {
            lat: values[0],
            lon: values[1],
            depth_km: values[2],
            magnitude: values[3],
        });
    }
    Ok(SourcesArg(sources))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_polyline() {
        let polyline = parse_polyline("35.0,139.0; 36.0,140.0").unwrap();
        assert_eq!(polyline.0.len(), 2);
        assert!((polyline.0[1].1 - 140.0).abs() < 1e-12);
        assert!(parse_polyline("35.0,139.0").is_err());
        assert!(parse_polyline("35.0;36.0,140.0").is_err());
    }

    #[test]
    fn test_parse_sources() {
        let sources = parse_sources("35.0,139.0,10,7.0;36.0,140.0,20,6.5").unwrap();
        assert_eq!(sources.0.len(), 2);
        assert!((sources.0[1].depth_km - 20.0).abs() < 1e-12);
        assert!(parse_sources("35.0,139.0,10").is_err());
        assert!(parse_sources("35.0,139.0,ten,7.0").is_err());
    }

    #[test]
    fn test_cli_shape() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
