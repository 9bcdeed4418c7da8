//! Background score recomputation.
//!
//! Scoring runs off the request path: a periodic task loads the corpus,
//! scores it on the blocking pool, writes the derived fields back to the
//! Paper Store and publishes a new [`ScoreSnapshot`]. Requests keep reading
//! the previous snapshot until the swap.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::scorer::DiscoveryScorer;
use super::snapshot::{ScoreSnapshot, SnapshotStore};
use super::{DiscoveryError, DiscoveryResult};
use crate::storage::{PaperStorage, ScoreUpdate};

/// Outcome of one recompute cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecomputeReport {
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    pub papers: usize,
    /// Rows whose derived fields were written back; 0 if the write-back failed
    pub persisted: usize,
    pub published: bool,
    pub duration_ms: u64,
}

pub struct ScoreRecomputer {
    storage: Arc<dyn PaperStorage>,
    scorer: DiscoveryScorer,
    snapshots: Arc<SnapshotStore>,
    running: Mutex<()>,
}

impl ScoreRecomputer {
    pub fn new(storage: Arc<dyn PaperStorage>, snapshots: Arc<SnapshotStore>) -> Self {
        Self {
            storage,
            scorer: DiscoveryScorer::new(),
            snapshots,
            running: Mutex::new(()),
        }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    /// Run one cycle scored against `now`.
    ///
    /// Cycles never overlap; a call made while one is running waits for it.
    /// A failed write-back is logged and the snapshot is still published,
    /// since the store keeps the ingested fields either way.
    pub async fn recompute(&self, now: DateTime<Utc>) -> DiscoveryResult<RecomputeReport> {
        let _guard = self.running.lock().await;
        let started = Instant::now();

        let papers = self.storage.get_all_papers().await?;
        let scorer = self.scorer;
        let scored = tokio::task::spawn_blocking(move || scorer.score_all(papers, now))
            .await
            .map_err(|e| DiscoveryError::Other(format!("scoring task failed: {}", e)))?;

        let updates: Vec<ScoreUpdate> = scored
            .iter()
            .filter_map(|p| {
                p.scores.clone().map(|scores| ScoreUpdate {
                    paper_id: p.id.clone(),
                    scores,
                })
            })
            .collect();
        let persisted = match self.storage.update_scores(&updates).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Failed to persist recomputed scores: {}", e);
                0
            }
        };

        let version = self.snapshots.next_version();
        let paper_count = scored.len();
        let published = self
            .snapshots
            .publish(ScoreSnapshot::build(version, now, scored));
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            version,
            papers = paper_count,
            persisted,
            published,
            duration_ms,
            "Recomputed discovery scores"
        );

        Ok(RecomputeReport {
            version,
            computed_at: now,
            papers: paper_count,
            persisted,
            published,
            duration_ms,
        })
    }

    /// Recompute every `interval` until the task is aborted.
    ///
    /// The first cycle runs one `interval` from now; callers publish the
    /// initial snapshot with [`recompute`](Self::recompute). Ticks missed
    /// while a cycle runs long are skipped rather than queued.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.recompute(Utc::now()).await {
                    error!("Score recompute failed: {}", e);
                }
            }
        })
    }
}
