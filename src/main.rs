//! Headless adapter shell. External watchers (OS focus observer, browser
//! bridge) pipe events in as JSON lines on stdin; on stream end the
//! tracker shuts down and the day's loss report and focus threads are
//! printed as JSON on stdout.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use focuslog::{
    analyze_day, cluster_sessions, ClusterConfig, Database, DomainChange, LossConfig, Observation,
    RulesStore, SessionTracker, TrackerConfig,
};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum InboundEvent {
    Observation(Observation),
    DomainChange(DomainChange),
}

fn data_dir() -> PathBuf {
    std::env::var_os("FOCUSLOG_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("focuslog-data"))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("focuslog.sqlite3"))?;
    let rules = Arc::new(RulesStore::new(data_dir.join("rules.json"))?);

    let tracker = SessionTracker::new(database.clone(), rules.clone(), TrackerConfig::default());
    let recovered = tracker.recover_orphans().await?;
    if recovered > 0 {
        warn!("closed {recovered} orphaned session(s) from a previous run");
    }
    tracker.start().await;

    info!("focuslog tracking; feed events as JSON lines on stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundEvent>(line) {
            Ok(InboundEvent::Observation(obs)) => {
                if let Err(err) = tracker.on_observation(obs).await {
                    warn!("observation rejected: {err:#}");
                }
            }
            Ok(InboundEvent::DomainChange(change)) => {
                if let Err(err) = tracker.on_domain_change(change).await {
                    warn!("domain change rejected: {err:#}");
                }
            }
            Err(err) => warn!("skipping malformed event line: {err}"),
        }
    }

    tracker.shutdown().await;

    let today = Utc::now().date_naive();
    let sessions = database.get_sessions_for_day(today).await?;
    let snapshot = rules.snapshot();
    let report = analyze_day(&sessions, today, &snapshot, &LossConfig::default());
    let clusters = cluster_sessions(&sessions, &snapshot, &ClusterConfig::default());

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "report": report,
            "clusters": clusters,
        }))?
    );

    Ok(())
}
