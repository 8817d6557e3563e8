use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::{Engine, Store};

/// Background task that rewrites the WAL once enough appends pile up.
/// Runs until the task is aborted.
pub async fn run_compactor<S: Store + 'static>(
    engine: Arc<Engine<S>>,
    threshold: u64,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

/// One compactor check. Returns whether a compaction ran and succeeded.
pub async fn compact_if_needed<S: Store>(engine: &Engine<S>, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    debug!("{appends} WAL appends since last compaction, compacting");
    match engine.compact_wal().await {
        Ok(()) => true,
        Err(e) => {
            // Retried on the next tick; the old WAL is still intact.
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Spawn [`run_compactor`] with the thresholds from `config`.
pub fn spawn<S: Store + 'static>(engine: Arc<Engine<S>>, config: &EngineConfig) -> JoinHandle<()> {
    let threshold = config.compact_threshold;
    let every = config.compact_interval;
    tokio::spawn(run_compactor(engine, threshold, every))
}
