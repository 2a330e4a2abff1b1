//! Participant registry: at-most-once membership per lottery.

use crate::{
    is_expired, LotteryId, LotteryStore, Participant, RaffleError, Result, TimestampMs, UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Join/list surface over the participant sub-collection. Uniqueness is
/// not checked here; the store's conditional insert is the authority, so
/// two near-simultaneous joins by the same identity resolve to exactly one
/// success without a read-then-write race.
pub struct ParticipantRegistry {
    store: Arc<dyn LotteryStore>,
}

impl ParticipantRegistry {
    pub fn new(store: Arc<dyn LotteryStore>) -> Self {
        Self { store }
    }

    /// Join a lottery. Rejected once the lottery is expired or settled.
    pub fn join(
        &self,
        lottery_id: &LotteryId,
        user_id: &UserId,
        now: TimestampMs,
    ) -> Result<Participant> {
        let rec = self.store.get(lottery_id)?;
        if rec.lottery.is_settled() || is_expired(rec.lottery.end_at, now) {
            return Err(RaffleError::LotteryClosed(lottery_id.clone()));
        }

        let participant = Participant {
            lottery_id: lottery_id.clone(),
            user_id: user_id.clone(),
            joined_at: now,
            winner: false,
        };
        match self.store.insert_participant(participant.clone()) {
            Ok(()) => {
                debug!(lottery = %lottery_id, user = %user_id, "participant joined");
                Ok(participant)
            }
            Err(err) => {
                if matches!(err, RaffleError::AlreadyJoined { .. }) {
                    debug!(lottery = %lottery_id, user = %user_id, "duplicate join rejected");
                }
                Err(err)
            }
        }
    }

    pub fn list_for(&self, lottery_id: &LotteryId) -> Result<Vec<Participant>> {
        self.store.participants_of(lottery_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryLotteryStore, Lottery, LotteryStatus};

    fn setup() -> (Arc<InMemoryLotteryStore>, ParticipantRegistry, LotteryId) {
        let store = Arc::new(InMemoryLotteryStore::new());
        let id = LotteryId("l1".into());
        store
            .insert_lottery(Lottery {
                id: id.clone(),
                title: "title".into(),
                description: "description".into(),
                owner: UserId("owner".into()),
                end_at: TimestampMs(10_000),
                prize_count: 1,
                created_at: TimestampMs(1_000),
                status: LotteryStatus::Open,
            })
            .unwrap();
        let registry = ParticipantRegistry::new(store.clone());
        (store, registry, id)
    }

    #[test]
    fn join_before_expiry_succeeds_once() {
        let (_store, registry, id) = setup();
        let user = UserId("alice".into());

        registry.join(&id, &user, TimestampMs(5_000)).unwrap();
        let err = registry.join(&id, &user, TimestampMs(5_001)).unwrap_err();
        assert!(matches!(err, RaffleError::AlreadyJoined { .. }));
        assert_eq!(registry.list_for(&id).unwrap().len(), 1);
    }

    #[test]
    fn join_after_expiry_rejected() {
        let (_store, registry, id) = setup();
        let err = registry
            .join(&id, &UserId("alice".into()), TimestampMs(10_000))
            .unwrap_err();
        assert!(matches!(err, RaffleError::LotteryClosed(_)));
        assert!(registry.list_for(&id).unwrap().is_empty());
    }

    #[test]
    fn join_after_settlement_rejected() {
        let (store, registry, id) = setup();
        let rev = store.get(&id).unwrap().revision;
        store
            .commit_draw(
                &id,
                rev,
                crate::DrawCommit::Empty {
                    drawn_at: TimestampMs(4_000),
                },
            )
            .unwrap();

        // Still before end_at, but the lottery is settled.
        let err = registry
            .join(&id, &UserId("alice".into()), TimestampMs(5_000))
            .unwrap_err();
        assert!(matches!(err, RaffleError::LotteryClosed(_)));
    }

    #[test]
    fn join_unknown_lottery_not_found() {
        let (_store, registry, _id) = setup();
        let err = registry
            .join(
                &LotteryId("missing".into()),
                &UserId("alice".into()),
                TimestampMs(5_000),
            )
            .unwrap_err();
        assert!(matches!(err, RaffleError::NotFound(_)));
    }
}
