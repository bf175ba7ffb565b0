use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::Engine;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// What one maintenance pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub published: usize,
    pub completed: usize,
}

/// One maintenance pass: refresh the remote snapshots, publish confirmed
/// bookings, complete the ones whose date has passed.
pub async fn sweep(engine: &Engine) -> Sweep {
    if let Err(e) = engine.refresh().await {
        warn!("reaper refresh failed: {e}");
    }
    let published = engine.publish_confirmed().await.unwrap_or_else(|e| {
        warn!("reaper publish failed: {e}");
        0
    });
    let completed = engine.complete_past().await.unwrap_or_else(|e| {
        warn!("reaper completion failed: {e}");
        0
    });
    Sweep {
        published,
        completed,
    }
}

/// Background task running [`sweep`] every `every`.
pub async fn run_reaper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let done = sweep(&engine).await;
        if done != Sweep::default() {
            info!(
                "reaper published {} and completed {} bookings",
                done.published, done.completed
            );
        } else {
            debug!("reaper pass: nothing to do");
        }
    }
}

/// Background task compacting the WAL once `threshold` appends have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}

/// Spawn the reaper and the compactor for `engine` with the intervals in
/// `config`.
pub fn spawn_maintenance(engine: Arc<Engine>, config: &Config) -> [JoinHandle<()>; 2] {
    let reaper = tokio::spawn(run_reaper(
        engine.clone(),
        Duration::from_secs(config.reaper_interval_secs),
    ));
    let compactor = tokio::spawn(run_compactor(engine, config.compact_threshold));
    [reaper, compactor]
}
