//! Fair random winner selection.

use crate::{Participant, UserId};
use rand::Rng;

/// Strategy for choosing winners from a participant pool.
///
/// Implementations must return exactly `min(prize_count, participants)`
/// ids, each identifying a distinct participant, with no weighting by join
/// time or any other attribute. Determinism is not required.
pub trait WinnerSelector: Send + Sync {
    fn select(&self, participants: &[Participant], prize_count: u32) -> Vec<UserId>;
}

/// Uniform selection without replacement via a partial Fisher-Yates
/// shuffle: only the first `k` positions are shuffled, each drawn from the
/// remaining suffix.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformSelector;

impl UniformSelector {
    pub fn new() -> Self {
        Self
    }

    /// Selection against a caller-supplied rng, for seeded tests and
    /// fairness sampling.
    pub fn select_with_rng<R: Rng>(
        rng: &mut R,
        participants: &[Participant],
        prize_count: u32,
    ) -> Vec<UserId> {
        let k = (prize_count as usize).min(participants.len());
        let mut ids: Vec<UserId> = participants.iter().map(|p| p.user_id.clone()).collect();
        for i in 0..k {
            let j = rng.gen_range(i..ids.len());
            ids.swap(i, j);
        }
        ids.truncate(k);
        ids
    }
}

impl WinnerSelector for UniformSelector {
    fn select(&self, participants: &[Participant], prize_count: u32) -> Vec<UserId> {
        Self::select_with_rng(&mut rand::thread_rng(), participants, prize_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LotteryId, TimestampMs};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn pool(n: usize) -> Vec<Participant> {
        (0..n)
            .map(|i| Participant {
                lottery_id: LotteryId("l1".into()),
                user_id: UserId(format!("user-{}", i)),
                joined_at: TimestampMs(1_000 + i as i64),
                winner: false,
            })
            .collect()
    }

    #[test]
    fn cardinality_is_min_of_prizes_and_pool() {
        let selector = UniformSelector::new();
        let participants = pool(5);

        assert_eq!(selector.select(&participants, 2).len(), 2);
        assert_eq!(selector.select(&participants, 5).len(), 5);
        assert_eq!(selector.select(&participants, 9).len(), 5);
    }

    #[test]
    fn everyone_wins_when_prizes_cover_the_pool() {
        let selector = UniformSelector::new();
        let participants = pool(3);

        let mut winners = selector.select(&participants, 10);
        winners.sort();
        let mut expected: Vec<UserId> =
            participants.iter().map(|p| p.user_id.clone()).collect();
        expected.sort();
        assert_eq!(winners, expected);
    }

    #[test]
    fn winners_are_distinct_participants() {
        let mut rng = StdRng::seed_from_u64(7);
        let participants = pool(20);

        for _ in 0..200 {
            let winners = UniformSelector::select_with_rng(&mut rng, &participants, 8);
            assert_eq!(winners.len(), 8);
            let mut deduped = winners.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(deduped.len(), 8);
            for w in &winners {
                assert!(participants.iter().any(|p| &p.user_id == w));
            }
        }
    }

    #[test]
    fn selection_frequency_is_roughly_uniform() {
        // P = 5, K = 2: each participant should win with frequency near
        // K/P = 0.4. Seeded rng keeps the check reproducible.
        let mut rng = StdRng::seed_from_u64(42);
        let participants = pool(5);
        let trials = 20_000usize;

        let mut wins: HashMap<UserId, usize> = HashMap::new();
        for _ in 0..trials {
            for w in UniformSelector::select_with_rng(&mut rng, &participants, 2) {
                *wins.entry(w).or_default() += 1;
            }
        }

        for p in &participants {
            let freq = *wins.get(&p.user_id).unwrap_or(&0) as f64 / trials as f64;
            assert!(
                (freq - 0.4).abs() < 0.02,
                "frequency {} for {} outside tolerance",
                freq,
                p.user_id
            );
        }
    }
}
