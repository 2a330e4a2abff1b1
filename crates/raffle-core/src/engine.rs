//! The draw engine: single entry point for every settlement trigger.
//!
//! Three independent callers can race to settle the same lottery: the
//! scheduled sweep, a manual owner/admin request, and a read request that
//! observes expiry and lazily triggers. All three enter through
//! [`DrawEngine::draw`]; the original system gave each its own code path
//! with bespoke retry loops, which is exactly where its inconsistencies
//! came from.
//!
//! The transition out of `Open` is guarded by the store's conditional
//! commit. Exactly one caller's write succeeds; everyone else observes the
//! settled state and gets [`DrawOutcome::AlreadyDrawn`] with the stored
//! winner set read back, never recomputed.

use crate::store::read_settled_result;
use crate::{
    is_expired, Caller, Lottery, LotteryId, LotteryStore, RaffleError, RaffleMetrics, Result,
    TimestampMs, UserId, WinnerSelector,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// How a draw attempt entered the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawTrigger {
    /// Scheduled sweep over expired-undrawn lotteries. No caller identity.
    Sweep,
    /// A read observed expiry and triggered settlement. No caller identity.
    LazyRead,
    /// Explicit request by the lottery owner or an admin. May settle
    /// before expiry.
    Manual { caller: Caller },
}

impl DrawTrigger {
    fn label(&self) -> &'static str {
        match self {
            DrawTrigger::Sweep => "sweep",
            DrawTrigger::LazyRead => "lazy_read",
            DrawTrigger::Manual { .. } => "manual",
        }
    }
}

/// Settled state of a lottery as reported to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    pub lottery_id: LotteryId,
    pub winner_count: u32,
    pub winner_ids: Vec<UserId>,
    pub no_participants: bool,
    pub drawn_at: TimestampMs,
}

/// Outcome of a draw attempt. `AlreadyDrawn` is success-via-idempotence,
/// not a fault: another trigger got there first and the desired end state
/// holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawOutcome {
    /// This attempt committed the settlement.
    Drawn(DrawResult),
    /// The lottery was already settled; carries the stored result.
    AlreadyDrawn(DrawResult),
}

impl DrawOutcome {
    pub fn result(&self) -> &DrawResult {
        match self {
            DrawOutcome::Drawn(r) | DrawOutcome::AlreadyDrawn(r) => r,
        }
    }

    /// Whether this attempt was the one that committed.
    pub fn is_fresh(&self) -> bool {
        matches!(self, DrawOutcome::Drawn(_))
    }
}

/// State-machine core transitioning lotteries from open to settled.
pub struct DrawEngine {
    store: Arc<dyn LotteryStore>,
    selector: Arc<dyn WinnerSelector>,
    metrics: Arc<RaffleMetrics>,
}

impl DrawEngine {
    pub fn new(
        store: Arc<dyn LotteryStore>,
        selector: Arc<dyn WinnerSelector>,
        metrics: Arc<RaffleMetrics>,
    ) -> Self {
        Self {
            store,
            selector,
            metrics,
        }
    }

    /// Attempt to settle a lottery.
    ///
    /// On a revision conflict (a concurrent writer moved the lottery or
    /// its participant set between read and commit), the whole
    /// read-compute-write sequence is retried once against fresh state;
    /// a second conflict surfaces as retryable. Partial commits are
    /// impossible by the store contract.
    pub fn draw(
        &self,
        lottery_id: &LotteryId,
        trigger: DrawTrigger,
        now: TimestampMs,
    ) -> Result<DrawOutcome> {
        match self.attempt(lottery_id, &trigger, now) {
            Err(RaffleError::RevisionConflict(_)) => {
                warn!(
                    lottery = %lottery_id,
                    trigger = trigger.label(),
                    "settlement hit a concurrent writer, retrying with fresh state"
                );
                self.attempt(lottery_id, &trigger, now)
            }
            other => other,
        }
    }

    fn attempt(
        &self,
        lottery_id: &LotteryId,
        trigger: &DrawTrigger,
        now: TimestampMs,
    ) -> Result<DrawOutcome> {
        let rec = self.store.get(lottery_id)?;
        if rec.lottery.is_settled() {
            return self.already_drawn(&rec.lottery);
        }

        self.authorize(trigger, &rec.lottery, now)?;

        let participants = self.store.participants_of(lottery_id)?;
        let commit = if participants.is_empty() {
            if matches!(trigger, DrawTrigger::Manual { .. }) {
                // Manual callers are told nobody joined instead of the
                // lottery silently settling empty under them.
                return Err(RaffleError::NoParticipants(lottery_id.clone()));
            }
            crate::DrawCommit::Empty { drawn_at: now }
        } else {
            let winner_ids = self
                .selector
                .select(&participants, rec.lottery.prize_count);
            crate::DrawCommit::Winners {
                winner_ids,
                drawn_at: now,
            }
        };

        match self.store.commit_draw(lottery_id, rec.revision, commit) {
            Ok(()) => {
                let settled = self.store.get(lottery_id)?;
                let participants = self.store.participants_of(lottery_id)?;
                let result = read_settled_result(&settled.lottery, &participants)?;
                self.metrics.record_draw_completed();
                if result.no_participants {
                    self.metrics.record_empty_settlement();
                }
                info!(
                    lottery = %lottery_id,
                    trigger = trigger.label(),
                    winner_count = result.winner_count,
                    no_participants = result.no_participants,
                    "lottery settled"
                );
                Ok(DrawOutcome::Drawn(result))
            }
            Err(RaffleError::AlreadyDrawn(_)) => {
                // Lost the race; the post-state is what this caller wanted.
                let settled = self.store.get(lottery_id)?;
                self.already_drawn(&settled.lottery)
            }
            Err(err) => Err(err),
        }
    }

    fn authorize(&self, trigger: &DrawTrigger, lottery: &Lottery, now: TimestampMs) -> Result<()> {
        match trigger {
            DrawTrigger::Manual { caller } => {
                if caller.admin || caller.user_id == lottery.owner {
                    Ok(())
                } else {
                    Err(RaffleError::Unauthorized(format!(
                        "user {} may not draw lottery {}",
                        caller.user_id, lottery.id
                    )))
                }
            }
            DrawTrigger::Sweep | DrawTrigger::LazyRead => {
                if is_expired(lottery.end_at, now) {
                    Ok(())
                } else {
                    Err(RaffleError::NotExpired(lottery.id.clone()))
                }
            }
        }
    }

    fn already_drawn(&self, lottery: &Lottery) -> Result<DrawOutcome> {
        let participants = self.store.participants_of(&lottery.id)?;
        let result = read_settled_result(lottery, &participants)?;
        self.metrics.record_already_drawn();
        Ok(DrawOutcome::AlreadyDrawn(result))
    }
}
