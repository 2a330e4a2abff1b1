//! In-process counters for the draw lifecycle.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A simple counter that can only increase.
#[derive(Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Aggregate counters for the raffle core.
#[derive(Default)]
pub struct RaffleMetrics {
    lotteries_created: Counter,
    participants_joined: Counter,
    join_conflicts: Counter,
    draws_completed: Counter,
    draws_already_drawn: Counter,
    empty_settlements: Counter,
    sweeps_run: Counter,
    sweep_failures: Counter,
}

impl RaffleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lottery_created(&self) {
        self.lotteries_created.inc();
    }

    pub fn record_join(&self) {
        self.participants_joined.inc();
    }

    pub fn record_join_conflict(&self) {
        self.join_conflicts.inc();
    }

    /// A fresh settlement committed by this process.
    pub fn record_draw_completed(&self) {
        self.draws_completed.inc();
    }

    /// A draw attempt that observed an already-settled lottery.
    pub fn record_already_drawn(&self) {
        self.draws_already_drawn.inc();
    }

    pub fn record_empty_settlement(&self) {
        self.empty_settlements.inc();
    }

    pub fn record_sweep(&self) {
        self.sweeps_run.inc();
    }

    pub fn record_sweep_failure(&self) {
        self.sweep_failures.inc();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lotteries_created: self.lotteries_created.get(),
            participants_joined: self.participants_joined.get(),
            join_conflicts: self.join_conflicts.get(),
            draws_completed: self.draws_completed.get(),
            draws_already_drawn: self.draws_already_drawn.get(),
            empty_settlements: self.empty_settlements.get(),
            sweeps_run: self.sweeps_run.get(),
            sweep_failures: self.sweep_failures.get(),
        }
    }
}

/// Point-in-time view of the counters, for reports and logs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub lotteries_created: u64,
    pub participants_joined: u64,
    pub join_conflicts: u64,
    pub draws_completed: u64,
    pub draws_already_drawn: u64,
    pub empty_settlements: u64,
    pub sweeps_run: u64,
    pub sweep_failures: u64,
}
