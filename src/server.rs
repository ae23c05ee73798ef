//! Web server for live scenario snapshots.
//!
//! A demo consumer of the engine's read-only surface:
//! - Axum for the HTTP server
//! - SSE (Server-Sent Events) for per-tick frame updates
//! - a small embedded page that renders the stream
//!
//! The scenario runs on a background task; clients only ever receive
//! serialized end-of-tick views.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::{
        Html, IntoResponse, Json,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::engine::{Engine, FrameReport, SceneSnapshot, ScenarioOptions};
use crate::regions::Region;
use crate::stations::StationInfo;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Wall-clock interval between ticks.
    pub tick_ms: u64,
    pub time_scale: f64,
    pub lat: f64,
    pub lon: f64,
    pub depth_km: f64,
    pub magnitude: f64,
    pub eew_tracking: bool,
    pub seed: Option<u64>,
}

/// One SSE payload: the tick's events plus the scene they produced.
#[derive(Debug, Serialize)]
struct FramePayload<'a> {
    report: &'a FrameReport,
    snapshot: &'a SceneSnapshot,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Channel for broadcasting frames to SSE clients
    tx: broadcast::Sender<String>,
    /// Most recent end-of-tick view
    latest: Arc<RwLock<Option<SceneSnapshot>>>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/stream", get(sse_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the web server and the background scenario loop.
///
/// # Errors
///
/// Returns an error if the scenario is invalid or the listener cannot bind.
pub async fn run_server(
    config: ServerConfig,
    stations: Vec<StationInfo>,
    regions: Vec<Region>,
) -> anyhow::Result<()> {
    let (tx, _rx) = broadcast::channel::<String>(100);
    let latest = Arc::new(RwLock::new(None));

    let state = AppState {
        tx: tx.clone(),
        latest: latest.clone(),
    };

    let loop_state = state.clone();
    let loop_config = config.clone();
    tokio::spawn(async move {
        run_scenario(loop_state, loop_config, stations, regions).await;
    });

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("shindosim live view at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Background task that drives the scenario and broadcasts frames.
async fn run_scenario(
    state: AppState,
    config: ServerConfig,
    stations: Vec<StationInfo>,
    regions: Vec<Region>,
) {
    let mut engine = Engine::new(stations, regions);
    let options = ScenarioOptions {
        eew_tracking: config.eew_tracking,
        seed: config.seed,
    };
    let handle = match engine.create_single_scenario(
        config.lat,
        config.lon,
        config.depth_km,
        config.magnitude,
        options,
    ) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("failed to create scenario: {e}");
            return;
        }
    };
    if let Err(e) = engine.set_time_scale(handle, config.time_scale) {
        tracing::error!("invalid time scale: {e}");
        return;
    }

    let tick_ms = config.tick_ms.max(10);
    let dt = tick_ms as f64 / 1000.0;
    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));

    loop {
        interval.tick().await;

        let report = match engine.tick(handle, dt) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("tick failed: {e}");
                return;
            }
        };
        let Ok(snapshot) = engine.snapshot(handle) else {
            return;
        };

        let payload = FramePayload {
            report: &report,
            snapshot: &snapshot,
        };
        match serde_json::to_string(&payload) {
            Ok(json) => {
                // no subscribers is fine; keep ticking
                let _ = state.tx.send(json);
            }
            Err(e) => tracing::warn!("failed to serialize frame: {e}"),
        }
        *state.latest.write().await = Some(snapshot);
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Main page handler - serves the HTML UI.
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// SSE stream handler for real-time frames.
async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(json) => Some(Ok(Event::default().event("frame").data(json))),
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Latest end-of-tick view as JSON.
async fn snapshot_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.latest.read().await.clone())
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>shindosim live EEW view</title>
<style>
  body { font-family: ui-monospace, monospace; background: #0b1020; color: #dbe2f0; margin: 2rem; }
  h1 { font-size: 1.1rem; letter-spacing: 0.05em; }
  .row { display: flex; gap: 2rem; flex-wrap: wrap; }
  .panel { background: #141b31; border: 1px solid #27304e; border-radius: 8px; padding: 1rem; min-width: 18rem; }
  .stat { font-size: 1.6rem; font-weight: 700; }
  .dim { color: #7c86a5; font-size: 0.8rem; }
  #log { max-height: 22rem; overflow-y: auto; font-size: 0.85rem; }
  #log div { padding: 0.1rem 0; border-bottom: 1px solid #1d2540; }
  .lvl { color: #ffd166; } .rev { color: #ef476f; } .fin { color: #06d6a0; }
</style>
</head>
<body>
  <h1>shindosim live EEW view</h1>
  <div class="row">
    <div class="panel">
      <div class="dim">scenario time</div>
      <div class="stat" id="time">-</div>
      <div class="dim">stations triggered / detected (&ge;3)</div>
      <div class="stat" id="stations">-</div>
      <div class="dim">overall max</div>
      <div class="stat" id="max">-</div>
      <div class="dim" id="region"></div>
      <div class="dim" id="eew"></div>
    </div>
    <div class="panel" style="flex:1">
      <div class="dim">events</div>
      <div id="log"></div>
    </div>
  </div>
  <script>
    const log = document.getElementById('log');
    function add(cls, text) {
      const div = document.createElement('div');
      div.className = cls;
      div.textContent = text;
      log.prepend(div);
      while (log.children.length > 200) log.removeChild(log.lastChild);
    }
    const source = new EventSource('/stream');
    source.addEventListener('frame', (e) => {
      const { report, snapshot } = JSON.parse(e.data);
      const t = snapshot.scenario_time.toFixed(1);
      document.getElementById('time').textContent = t + ' s';
      const triggered = snapshot.stations.filter(s => s.intensity >= 0.5).length;
      const detected = snapshot.stations.filter(s => s.intensity >= 3.0).length;
      document.getElementById('stations').textContent = triggered + ' / ' + detected;
      document.getElementById('max').textContent = snapshot.overall_max.toFixed(1);
      document.getElementById('region').textContent = snapshot.overall_max_region_name;
      if (snapshot.eew_estimate) {
        const est = snapshot.eew_estimate;
        document.getElementById('eew').textContent =
          'EEW: M' + est.magnitude.toFixed(1) + ' ' + est.depth_km.toFixed(0) + 'km, ' +
          est.revisions + ' revisions' + (est.converged ? ' (converged)' : '');
      }
      for (const lvl of report.new_intensity_levels) add('lvl', 't=' + t + 's  shindo ' + lvl + ' first observed');
      if (report.revision) add('rev', 't=' + t + 's  EEW revision #' + report.revision.count +
        (report.revision.overthrown ? ' (overthrown)' : ''));
      if (report.final_report) add('fin', 't=' + t + 's  FINAL REPORT');
    });
  </script>
</body>
</html>
"##;
