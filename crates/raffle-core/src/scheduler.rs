//! Scheduled sweep over expired-undrawn lotteries.

use crate::{
    is_expired, Clock, DrawEngine, DrawOutcome, DrawTrigger, Lottery, LotteryId, LotteryStore,
    RaffleMetrics, Result, TimestampMs,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-lottery outcome of one sweep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepStatus {
    Drawn { winner_count: u32 },
    DrawnEmpty,
    AlreadyDrawn,
    Failed { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepItem {
    pub lottery_id: LotteryId,
    pub title: String,
    pub status: SweepStatus,
}

/// Result report of one sweep execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub swept_at: TimestampMs,
    pub items: Vec<SweepItem>,
}

impl SweepReport {
    pub fn settled_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| {
                matches!(
                    item.status,
                    SweepStatus::Drawn { .. } | SweepStatus::DrawnEmpty
                )
            })
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.status, SweepStatus::Failed { .. }))
            .count()
    }
}

/// Periodic sweep: finds expired-undrawn lotteries and pushes each through
/// the draw engine. Idempotent by construction; re-running against an
/// already-settled lottery is a safe no-op.
pub struct DrawScheduler {
    store: Arc<dyn LotteryStore>,
    engine: Arc<DrawEngine>,
    metrics: Arc<RaffleMetrics>,
    batch_limit: usize,
}

impl DrawScheduler {
    pub fn new(
        store: Arc<dyn LotteryStore>,
        engine: Arc<DrawEngine>,
        metrics: Arc<RaffleMetrics>,
        batch_limit: usize,
    ) -> Self {
        Self {
            store,
            engine,
            metrics,
            batch_limit,
        }
    }

    /// Execute one sweep. A failure on one lottery is recorded in its
    /// report item and never blocks the rest of the batch; only a failure
    /// of the candidate query itself aborts the sweep.
    pub fn run_sweep(&self, now: TimestampMs) -> Result<SweepReport> {
        let candidates = self.store.list_undrawn(self.batch_limit)?;
        debug!(candidates = candidates.len(), "sweep candidates fetched");

        let expired: Vec<Lottery> = candidates
            .into_iter()
            .filter(|lottery| is_expired(lottery.end_at, now))
            .collect();

        let mut items = Vec::with_capacity(expired.len());
        for lottery in expired {
            let status = match self.engine.draw(&lottery.id, DrawTrigger::Sweep, now) {
                Ok(DrawOutcome::Drawn(result)) if result.no_participants => {
                    SweepStatus::DrawnEmpty
                }
                Ok(DrawOutcome::Drawn(result)) => SweepStatus::Drawn {
                    winner_count: result.winner_count,
                },
                Ok(DrawOutcome::AlreadyDrawn(_)) => SweepStatus::AlreadyDrawn,
                Err(err) => {
                    warn!(lottery = %lottery.id, error = %err, "sweep item failed");
                    self.metrics.record_sweep_failure();
                    SweepStatus::Failed {
                        message: err.to_string(),
                    }
                }
            };
            items.push(SweepItem {
                lottery_id: lottery.id,
                title: lottery.title,
                status,
            });
        }

        self.metrics.record_sweep();
        let report = SweepReport {
            swept_at: now,
            items,
        };
        info!(
            settled = report.settled_count(),
            failed = report.failed_count(),
            total = report.items.len(),
            "sweep finished"
        );
        Ok(report)
    }

    /// Start a background thread firing [`Self::run_sweep`] at a fixed
    /// interval until shutdown.
    pub fn start(self: &Arc<Self>, clock: Arc<dyn Clock>, interval: Duration) -> SweepRunner {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_handle = Arc::clone(&stop);
        let scheduler = Arc::clone(self);

        let handle = thread::spawn(move || {
            let mut last_sweep = Instant::now()
                .checked_sub(interval)
                .unwrap_or_else(Instant::now);
            while !stop_handle.load(Ordering::Relaxed) {
                if last_sweep.elapsed() >= interval {
                    last_sweep = Instant::now();
                    if let Err(err) = scheduler.run_sweep(clock.now()) {
                        warn!(error = %err, "sweep aborted");
                    }
                }
                thread::sleep(Duration::from_millis(20));
            }
        });

        SweepRunner {
            stop,
            handle: Some(handle),
        }
    }
}

/// Handle on the background sweep thread.
pub struct SweepRunner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SweepRunner {
    /// Signal the thread to stop and wait for it.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweepRunner {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
