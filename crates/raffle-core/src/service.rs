//! External interface of the raffle core.
//!
//! The excluded UI layer polls [`RaffleService::get_lottery_detail`] on a
//! countdown and calls join/draw on user action. Every operation takes
//! `now` explicitly; the clock stays at the process edges.

use crate::{
    is_expired, Caller, DrawEngine, DrawOutcome, DrawScheduler, DrawTrigger, Lottery, LotteryId,
    LotteryStatus, LotteryStore, Participant, ParticipantRegistry, RaffleConfig, RaffleError,
    RaffleMetrics, Result, SweepReport, TimestampMs, UniformSelector, UserId, WinnerSelector,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Request payload for lottery creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateLottery {
    pub title: String,
    /// Defaults to the title when empty.
    pub description: String,
    pub end_at: TimestampMs,
    pub prize_count: u32,
}

/// Detail view of a lottery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LotteryDetail {
    pub lottery: Lottery,
    pub is_expired: bool,
    pub participants: Vec<Participant>,
    pub winners: Vec<Participant>,
}

/// One page of the lottery listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LotteryPage {
    pub lotteries: Vec<Lottery>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Facade wiring the registry, engine and scheduler over one store.
pub struct RaffleService {
    store: Arc<dyn LotteryStore>,
    registry: ParticipantRegistry,
    engine: Arc<DrawEngine>,
    scheduler: Arc<DrawScheduler>,
    metrics: Arc<RaffleMetrics>,
    config: RaffleConfig,
}

impl RaffleService {
    pub fn new(store: Arc<dyn LotteryStore>, config: RaffleConfig) -> Self {
        Self::with_selector(store, Arc::new(UniformSelector::new()), config)
    }

    pub fn with_selector(
        store: Arc<dyn LotteryStore>,
        selector: Arc<dyn WinnerSelector>,
        config: RaffleConfig,
    ) -> Self {
        let metrics = Arc::new(RaffleMetrics::new());
        let engine = Arc::new(DrawEngine::new(store.clone(), selector, metrics.clone()));
        let scheduler = Arc::new(DrawScheduler::new(
            store.clone(),
            engine.clone(),
            metrics.clone(),
            config.sweep.batch_limit,
        ));
        Self {
            registry: ParticipantRegistry::new(store.clone()),
            store,
            engine,
            scheduler,
            metrics,
            config,
        }
    }

    pub fn engine(&self) -> Arc<DrawEngine> {
        self.engine.clone()
    }

    pub fn scheduler(&self) -> Arc<DrawScheduler> {
        self.scheduler.clone()
    }

    pub fn metrics(&self) -> Arc<RaffleMetrics> {
        self.metrics.clone()
    }

    /// Create a lottery. Requires the admin capability; all field
    /// validation happens here, before anything is persisted, so a
    /// rejected request leaves no state behind.
    pub fn create_lottery(
        &self,
        caller: &Caller,
        request: CreateLottery,
        now: TimestampMs,
    ) -> Result<Lottery> {
        if !caller.admin {
            return Err(RaffleError::Unauthorized(
                "lottery creation requires the admin capability".into(),
            ));
        }

        let title = request.title.trim().to_owned();
        if title.is_empty() {
            return Err(RaffleError::InvalidTitle("title must not be empty".into()));
        }
        if title.chars().count() > self.config.limits.max_title_len {
            return Err(RaffleError::InvalidTitle(format!(
                "title exceeds {} characters",
                self.config.limits.max_title_len
            )));
        }

        let description = request.description.trim().to_owned();
        if description.chars().count() > self.config.limits.max_description_len {
            return Err(RaffleError::InvalidDescription(format!(
                "description exceeds {} characters",
                self.config.limits.max_description_len
            )));
        }
        let description = if description.is_empty() {
            title.clone()
        } else {
            description
        };

        if request.end_at <= now {
            return Err(RaffleError::InvalidEndTime {
                end_at: request.end_at,
                now,
            });
        }

        if request.prize_count == 0 || request.prize_count > self.config.limits.max_prize_count {
            return Err(RaffleError::InvalidPrizeCount {
                got: request.prize_count,
                max: self.config.limits.max_prize_count,
            });
        }

        let lottery = Lottery {
            id: LotteryId::generate(),
            title,
            description,
            owner: caller.user_id.clone(),
            end_at: request.end_at,
            prize_count: request.prize_count,
            created_at: now,
            status: LotteryStatus::Open,
        };
        self.store.insert_lottery(lottery.clone())?;
        self.metrics.record_lottery_created();
        info!(
            lottery = %lottery.id,
            owner = %lottery.owner,
            end_at = %lottery.end_at,
            prize_count = lottery.prize_count,
            "lottery created"
        );
        Ok(lottery)
    }

    pub fn join_lottery(
        &self,
        lottery_id: &LotteryId,
        user_id: &UserId,
        now: TimestampMs,
    ) -> Result<Participant> {
        match self.registry.join(lottery_id, user_id, now) {
            Ok(participant) => {
                self.metrics.record_join();
                Ok(participant)
            }
            Err(err) => {
                if matches!(err, RaffleError::AlreadyJoined { .. }) {
                    self.metrics.record_join_conflict();
                }
                Err(err)
            }
        }
    }

    /// Manual draw by the lottery owner or an admin. Owner/admin may
    /// settle before expiry.
    pub fn draw_lottery(
        &self,
        lottery_id: &LotteryId,
        caller: &Caller,
        now: TimestampMs,
    ) -> Result<DrawOutcome> {
        self.engine.draw(
            lottery_id,
            DrawTrigger::Manual {
                caller: caller.clone(),
            },
            now,
        )
    }

    /// Detail view. An expired-but-open lottery is settled lazily before
    /// the read (read-repair), so redundant client polls are harmless and
    /// no client-side refresh coordination is needed.
    pub fn get_lottery_detail(&self, lottery_id: &LotteryId, now: TimestampMs) -> Result<LotteryDetail> {
        let rec = self.store.get(lottery_id)?;
        if !rec.lottery.is_settled() && is_expired(rec.lottery.end_at, now) {
            if let Err(err) = self.engine.draw(lottery_id, DrawTrigger::LazyRead, now) {
                // The read must still succeed; the sweep will pick the
                // settlement up if contention persists.
                warn!(lottery = %lottery_id, error = %err, "lazy settlement failed");
            }
        }

        let rec = self.store.get(lottery_id)?;
        let participants = self.store.participants_of(lottery_id)?;
        let winners = participants.iter().filter(|p| p.winner).cloned().collect();
        Ok(LotteryDetail {
            is_expired: is_expired(rec.lottery.end_at, now),
            lottery: rec.lottery,
            participants,
            winners,
        })
    }

    /// Winners of a settled lottery; empty while the lottery is open.
    pub fn get_winners(&self, lottery_id: &LotteryId) -> Result<Vec<Participant>> {
        let _ = self.store.get(lottery_id)?;
        let participants = self.store.participants_of(lottery_id)?;
        Ok(participants.into_iter().filter(|p| p.winner).collect())
    }

    /// Page of lotteries, newest first.
    pub fn list_lotteries(&self, offset: usize, limit: usize) -> Result<LotteryPage> {
        Ok(LotteryPage {
            lotteries: self.store.list_page(offset, limit)?,
            total: self.store.count()?,
            offset,
            limit,
        })
    }

    pub fn run_scheduled_sweep(&self, now: TimestampMs) -> Result<SweepReport> {
        self.scheduler.run_sweep(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryLotteryStore;

    const NOW: TimestampMs = TimestampMs(1_000_000);

    fn service() -> RaffleService {
        RaffleService::new(
            Arc::new(InMemoryLotteryStore::new()),
            RaffleConfig::default(),
        )
    }

    fn create_request() -> CreateLottery {
        CreateLottery {
            title: "Friday giveaway".into(),
            description: "Two winners".into(),
            end_at: NOW.plus_minutes(15),
            prize_count: 2,
        }
    }

    #[test]
    fn create_requires_admin() {
        let service = service();
        let err = service
            .create_lottery(&Caller::user("alice"), create_request(), NOW)
            .unwrap_err();
        assert!(matches!(err, RaffleError::Unauthorized(_)));
        assert_eq!(service.list_lotteries(0, 10).unwrap().total, 0);
    }

    #[test]
    fn create_rejects_bad_fields_without_state_change() {
        let service = service();
        let admin = Caller::admin("root");

        let mut request = create_request();
        request.title = "   ".into();
        assert!(matches!(
            service.create_lottery(&admin, request, NOW).unwrap_err(),
            RaffleError::InvalidTitle(_)
        ));

        let mut request = create_request();
        request.end_at = NOW;
        assert!(matches!(
            service.create_lottery(&admin, request, NOW).unwrap_err(),
            RaffleError::InvalidEndTime { .. }
        ));

        let mut request = create_request();
        request.prize_count = 0;
        assert!(matches!(
            service.create_lottery(&admin, request, NOW).unwrap_err(),
            RaffleError::InvalidPrizeCount { .. }
        ));

        let mut request = create_request();
        request.prize_count = 10_000;
        assert!(matches!(
            service.create_lottery(&admin, request, NOW).unwrap_err(),
            RaffleError::InvalidPrizeCount { .. }
        ));

        assert_eq!(service.list_lotteries(0, 10).unwrap().total, 0);
    }

    #[test]
    fn empty_description_defaults_to_title() {
        let service = service();
        let mut request = create_request();
        request.description = "".into();

        let lottery = service
            .create_lottery(&Caller::admin("root"), request, NOW)
            .unwrap();
        assert_eq!(lottery.description, lottery.title);
    }

    #[test]
    fn detail_settles_expired_lottery_lazily() {
        let service = service();
        let lottery = service
            .create_lottery(&Caller::admin("root"), create_request(), NOW)
            .unwrap();
        service
            .join_lottery(&lottery.id, &UserId("alice".into()), NOW.plus_minutes(1))
            .unwrap();

        // Before expiry: open, no winners.
        let detail = service
            .get_lottery_detail(&lottery.id, NOW.plus_minutes(10))
            .unwrap();
        assert!(!detail.is_expired);
        assert!(!detail.lottery.is_settled());
        assert!(detail.winners.is_empty());

        // First read past expiry settles.
        let detail = service
            .get_lottery_detail(&lottery.id, NOW.plus_minutes(16))
            .unwrap();
        assert!(detail.is_expired);
        assert!(detail.lottery.is_settled());
        assert_eq!(detail.winners.len(), 1);
        assert_eq!(detail.participants.len(), 1);
    }

    #[test]
    fn winners_view_reads_marked_participants() {
        let service = service();
        let lottery = service
            .create_lottery(&Caller::admin("root"), create_request(), NOW)
            .unwrap();
        for user in ["alice", "bob", "carol"] {
            service
                .join_lottery(&lottery.id, &UserId(user.into()), NOW.plus_minutes(1))
                .unwrap();
        }
        assert!(service.get_winners(&lottery.id).unwrap().is_empty());

        let outcome = service
            .draw_lottery(&lottery.id, &Caller::admin("root"), NOW.plus_minutes(16))
            .unwrap();
        let winners = service.get_winners(&lottery.id).unwrap();
        assert_eq!(winners.len(), 2);
        for winner in &winners {
            assert!(outcome.result().winner_ids.contains(&winner.user_id));
        }
    }

    #[test]
    fn listing_pages_newest_first() {
        let service = service();
        let admin = Caller::admin("root");
        for i in 0..3 {
            let mut request = create_request();
            request.title = format!("lottery {}", i);
            service
                .create_lottery(&admin, request, NOW.plus_secs(i))
                .unwrap();
        }

        let page = service.list_lotteries(0, 2).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.lotteries.len(), 2);
        assert_eq!(page.lotteries[0].title, "lottery 2");

        let page = service.list_lotteries(2, 2).unwrap();
        assert_eq!(page.lotteries.len(), 1);
        assert_eq!(page.lotteries[0].title, "lottery 0");
    }

    #[test]
    fn sweep_passthrough_counts_metrics() {
        let service = service();
        let lottery = service
            .create_lottery(&Caller::admin("root"), create_request(), NOW)
            .unwrap();
        service
            .join_lottery(&lottery.id, &UserId("alice".into()), NOW.plus_minutes(1))
            .unwrap();

        let report = service.run_scheduled_sweep(NOW.plus_minutes(16)).unwrap();
        assert_eq!(report.settled_count(), 1);

        let snap = service.metrics().snapshot();
        assert_eq!(snap.lotteries_created, 1);
        assert_eq!(snap.participants_joined, 1);
        assert_eq!(snap.draws_completed, 1);
        assert_eq!(snap.sweeps_run, 1);
    }
}
