use anyhow::{Context, Result};
use chrono::Utc;
use dronetrack::stats::{self, FleetStats, PilotSummary};
use dronetrack::{
    PointsCollection, TrackAssigner, TrackStore, TrackerConfig, TrailsCollection, parse_message,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the replay command
pub struct ReplayConfig {
    pub tracker: TrackerConfig,
    pub input: String,
    pub anonymous: bool,
    pub tick_ms: u64,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct ReplayCounters {
    lines: u64,
    bad_lines: u64,
    features: u64,
    dropped: u64,
    rebuilds: u64,
}

/// Last snapshots seen by the render tick, to detect rebuilds by identity
#[derive(Default)]
struct RenderState {
    points: Option<Arc<PointsCollection>>,
    trails: Option<Arc<TrailsCollection>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayReport<'a> {
    points: &'a PointsCollection,
    trails: &'a TrailsCollection,
    stats: FleetStats,
    pilots: Vec<PilotSummary>,
    red_count: usize,
    green_count: usize,
}

pub async fn handle_replay(config: ReplayConfig) -> Result<()> {
    let ReplayConfig {
        tracker,
        input,
        anonymous,
        tick_ms,
        output,
    } = config;

    let mut assigner = anonymous.then(|| TrackAssigner::new(&tracker));
    let mut store = TrackStore::new(tracker);

    let reader: Box<dyn AsyncRead + Unpin + Send> = if input == "-" {
        info!("Reading transport messages from stdin");
        Box::new(tokio::io::stdin())
    } else {
        info!("Reading transport messages from {}", input);
        let file = tokio::fs::File::open(&input)
            .await
            .with_context(|| format!("Failed to open input {}", input))?;
        Box::new(file)
    };
    let mut lines = BufReader::new(reader).lines();

    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut counters = ReplayCounters::default();
    let mut render = RenderState::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                ingest_line(&line, &mut store, assigner.as_mut(), &mut counters);
            }
            _ = ticker.tick() => {
                render_tick(&mut store, &mut render, &mut counters);
            }
            _ = &mut shutdown => {
                info!("Received SIGINT (Ctrl+C), stopping replay");
                break;
            }
        }
    }

    info!(
        "Replay finished: {} lines ({} unreadable), {} features, {} dropped, {} tracks, {} view rebuilds",
        counters.lines,
        counters.bad_lines,
        counters.features,
        counters.dropped,
        store.len(),
        counters.rebuilds
    );

    let points = store.points();
    let trails = store.trails();
    let report = ReplayReport {
        points: &points,
        trails: &trails,
        stats: stats::fleet_stats(&store, Utc::now()),
        pilots: stats::pilot_breakdown(&store),
        red_count: store.red_count(),
        green_count: store.green_count(),
    };
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote report to {:?}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn ingest_line(
    line: &str,
    store: &mut TrackStore,
    assigner: Option<&mut TrackAssigner>,
    counters: &mut ReplayCounters,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    counters.lines += 1;

    let features = match parse_message(line) {
        Ok(features) => features,
        Err(e) => {
            counters.bad_lines += 1;
            warn!("Skipping line {}: {:#}", counters.lines, e);
            return;
        }
    };

    // one transport message is one assignment batch
    let features = match assigner {
        Some(assigner) => assigner.assign(features),
        None => features,
    };

    for feature in &features {
        counters.features += 1;
        if store.upsert(feature).is_dropped() {
            counters.dropped += 1;
        }
    }
}

fn render_tick(store: &mut TrackStore, render: &mut RenderState, counters: &mut ReplayCounters) {
    let points = store.points();
    let trails = store.trails();

    let points_changed = !render
        .points
        .as_ref()
        .is_some_and(|prev| Arc::ptr_eq(prev, &points));
    let trails_changed = !render
        .trails
        .as_ref()
        .is_some_and(|prev| Arc::ptr_eq(prev, &trails));

    if points_changed || trails_changed {
        counters.rebuilds += u64::from(points_changed) + u64::from(trails_changed);
        debug!(
            "Render tick: {} markers, {} trails, {} unauthorized",
            points.len(),
            trails.len(),
            store.red_count()
        );
    }

    render.points = Some(points);
    render.trails = Some(trails);
}
