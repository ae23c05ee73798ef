//! shindosim - Japan-style EEW propagation and intensity simulator.
//!
//! A terminal-first demo driver over the simulation engine: run a single
//! hypocenter or a multi-source rupture, stream the frame events, or serve
//! live snapshots over SSE.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use shindosim::cli::{Cli, Command, CommonArgs, MultiArgs, ServeArgs, SingleArgs};
use shindosim::engine::{Engine, ScenarioHandle, ScenarioOptions};
use shindosim::models::{RegionCollection, StationRecord, stations_from_records};
use shindosim::output;
use shindosim::regions::Region;
use shindosim::server;
use shindosim::stations::StationInfo;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Single(args) => cmd_single(args),
        Command::Multi(args) => cmd_multi(args),
        Command::Serve(args) => cmd_serve(args),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Load the optional station and region input files.
fn load_inputs(
    stations_path: Option<&PathBuf>,
    regions_path: Option<&PathBuf>,
) -> Result<(Vec<StationInfo>, Vec<Region>)> {
    let stations = match stations_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read station file {}", path.display()))?;
            let records: Vec<StationRecord> =
                serde_json::from_str(&text).context("failed to parse station list")?;
            for record in &records {
                record.validate().map_err(anyhow::Error::msg)?;
            }
            stations_from_records(&records)
        }
        None => Vec::new(),
    };

    let regions = match regions_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read region file {}", path.display()))?;
            let collection: RegionCollection =
                serde_json::from_str(&text).context("failed to parse region GeoJSON")?;
            collection.validate().map_err(anyhow::Error::msg)?;
            collection.to_regions()
        }
        None => Vec::new(),
    };

    Ok((stations, regions))
}

/// Tick a scenario to its end, streaming frames as they happen.
fn run_loop(engine: &mut Engine, handle: ScenarioHandle, common: &CommonArgs) -> Result<()> {
    engine.set_time_scale(handle, common.time_scale)?;
    let tick = common.tick.max(1e-3);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut elapsed = 0.0;
    while elapsed < common.duration {
        let report = engine.tick(handle, tick)?;
        elapsed = report.scenario_time;
        let snapshot = engine.snapshot(handle)?;
        output::write_frame(&mut out, &report, &snapshot, common.format)?;
        if output::is_notable(&report) {
            out.flush()?;
        }
    }

    let snapshot = engine.snapshot(handle)?;
    output::write_summary(&mut out, &snapshot, common.format)?;
    Ok(())
}

/// Execute the `single` command.
fn cmd_single(args: SingleArgs) -> Result<()> {
    let (stations, regions) =
        load_inputs(args.common.stations.as_ref(), args.common.regions.as_ref())?;
    let mut engine = Engine::new(stations, regions);

    let handle = engine.create_single_scenario(
        args.lat,
        args.lon,
        args.depth,
        args.magnitude,
        ScenarioOptions {
            eew_tracking: !args.no_tracking,
            seed: args.common.seed,
        },
    )?;

    run_loop(&mut engine, handle, &args.common)
}

/// Execute the `multi` command.
fn cmd_multi(args: MultiArgs) -> Result<()> {
    let (stations, regions) =
        load_inputs(args.common.stations.as_ref(), args.common.regions.as_ref())?;
    let mut engine = Engine::new(stations, regions);

    let handle = engine.create_multi_scenario(
        &args.fault.0,
        &args.sources.0,
        args.start,
        args.direction,
        args.velocity,
        ScenarioOptions {
            eew_tracking: false,
            seed: args.common.seed,
        },
    )?;

    run_loop(&mut engine, handle, &args.common)
}

/// Execute the `serve` command.
fn cmd_serve(args: ServeArgs) -> Result<()> {
    let (stations, regions) = load_inputs(args.stations.as_ref(), args.regions.as_ref())?;

    let config = server::ServerConfig {
        host: args.host.clone(),
        port: args.port,
        tick_ms: args.tick_ms,
        time_scale: args.time_scale,
        lat: args.lat,
        lon: args.lon,
        depth_km: args.depth,
        magnitude: args.magnitude,
        eew_tracking: !args.no_tracking,
        seed: args.seed,
    };

    println!("shindosim live view");
    println!("  Local:  http://{}:{}", args.host, args.port);
    println!("  Source: ({:.2}, {:.2}) {:.0}km M{:.1}", args.lat, args.lon, args.depth, args.magnitude);
    println!("  Press Ctrl+C to stop\n");

    // Run the async server on tokio runtime
    tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")?
        .block_on(server::run_server(config, stations, regions))
}
