//! Storage boundary for lotteries and participants.
//!
//! The core never talks to a storage engine directly; it goes through
//! [`LotteryStore`], which models a document store with two primitives the
//! draw lifecycle depends on:
//!
//! - a **conditional insert** on the composite `(lottery, user)` key that
//!   also refuses settled lotteries, so a duplicate join or a join racing
//!   a settlement loses at the storage layer rather than in a
//!   read-then-write check;
//! - a **conditional settlement commit** ([`LotteryStore::commit_draw`])
//!   that flips the lottery status and marks winners as one unit, guarded
//!   by a per-lottery revision counter. Exactly one of any set of racing
//!   writers commits; the rest observe [`RaffleError::AlreadyDrawn`] or
//!   [`RaffleError::RevisionConflict`].
//!
//! The revision counter is bumped by every lottery or participant-set
//! mutation, so a settlement computed against a stale participant snapshot
//! cannot commit.

use crate::{
    DrawResult, Lottery, LotteryId, LotteryStatus, Participant, RaffleError, Result, TimestampMs,
    UserId,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// A lottery together with its storage revision, read as one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedLottery {
    pub lottery: Lottery,
    pub revision: u64,
}

/// The settlement write, prepared outside the store and committed
/// atomically inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawCommit {
    /// Settle with the given winners; each must identify a current
    /// participant, none may already be a winner.
    Winners {
        winner_ids: Vec<UserId>,
        drawn_at: TimestampMs,
    },
    /// Settle a lottery whose participant set was empty at draw time.
    Empty { drawn_at: TimestampMs },
}

/// Storage surface consumed by the core.
pub trait LotteryStore: Send + Sync {
    fn insert_lottery(&self, lottery: Lottery) -> Result<()>;

    fn get(&self, id: &LotteryId) -> Result<VersionedLottery>;

    /// Total number of lotteries, for paging.
    fn count(&self) -> Result<usize>;

    /// Page of lotteries, newest first.
    fn list_page(&self, offset: usize, limit: usize) -> Result<Vec<Lottery>>;

    /// Undrawn lotteries in creation order, capped at `limit`. Sweep
    /// candidates; expiry filtering is the caller's job.
    fn list_undrawn(&self, limit: usize) -> Result<Vec<Lottery>>;

    /// Conditional insert on the composite `(lottery_id, user_id)` key.
    /// Also rejects with [`RaffleError::LotteryClosed`] once the lottery
    /// is settled, atomically with the settled check.
    fn insert_participant(&self, participant: Participant) -> Result<()>;

    fn participants_of(&self, id: &LotteryId) -> Result<Vec<Participant>>;

    /// Atomic check-and-set settlement: verifies the lottery is still
    /// `Open` at `expected_revision`, then flips status and marks winners
    /// as one unit. Never partially commits.
    fn commit_draw(
        &self,
        id: &LotteryId,
        expected_revision: u64,
        commit: DrawCommit,
    ) -> Result<()>;
}

struct LotteryRow {
    lottery: Lottery,
    revision: u64,
}

#[derive(Default)]
struct StoreInner {
    lotteries: HashMap<LotteryId, LotteryRow>,
    /// Creation order, for stable listing.
    order: Vec<LotteryId>,
    /// Participants per lottery, in join order.
    participants: HashMap<LotteryId, Vec<Participant>>,
}

/// In-memory store. All conditional semantics are enforced under a single
/// write lock per mutation, which is the in-process analogue of the
/// document-store transaction the production backend would provide.
#[derive(Default)]
pub struct InMemoryLotteryStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryLotteryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreInner>> {
        self.inner
            .read()
            .map_err(|_| RaffleError::Storage("lottery store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreInner>> {
        self.inner
            .write()
            .map_err(|_| RaffleError::Storage("lottery store lock poisoned".into()))
    }
}

impl LotteryStore for InMemoryLotteryStore {
    fn insert_lottery(&self, lottery: Lottery) -> Result<()> {
        let mut inner = self.write()?;
        if inner.lotteries.contains_key(&lottery.id) {
            return Err(RaffleError::Storage(format!(
                "duplicate lottery id {}",
                lottery.id
            )));
        }
        let id = lottery.id.clone();
        inner.order.push(id.clone());
        inner.participants.insert(id.clone(), Vec::new());
        inner.lotteries.insert(
            id,
            LotteryRow {
                lottery,
                revision: 0,
            },
        );
        Ok(())
    }

    fn get(&self, id: &LotteryId) -> Result<VersionedLottery> {
        let inner = self.read()?;
        let row = inner
            .lotteries
            .get(id)
            .ok_or_else(|| RaffleError::NotFound(id.clone()))?;
        Ok(VersionedLottery {
            lottery: row.lottery.clone(),
            revision: row.revision,
        })
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read()?.order.len())
    }

    fn list_page(&self, offset: usize, limit: usize) -> Result<Vec<Lottery>> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|id| inner.lotteries.get(id).map(|row| row.lottery.clone()))
            .collect())
    }

    fn list_undrawn(&self, limit: usize) -> Result<Vec<Lottery>> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.lotteries.get(id))
            .filter(|row| !row.lottery.is_settled())
            .take(limit)
            .map(|row| row.lottery.clone())
            .collect())
    }

    fn insert_participant(&self, participant: Participant) -> Result<()> {
        let mut inner = self.write()?;
        let lottery_id = participant.lottery_id.clone();
        let row = inner
            .lotteries
            .get(&lottery_id)
            .ok_or_else(|| RaffleError::NotFound(lottery_id.clone()))?;
        // Checked under the same lock as commit_draw: a join racing a
        // settlement cannot land after the status flips.
        if row.lottery.is_settled() {
            return Err(RaffleError::LotteryClosed(lottery_id));
        }
        let entries = inner.participants.entry(lottery_id.clone()).or_default();
        if entries.iter().any(|p| p.user_id == participant.user_id) {
            return Err(RaffleError::AlreadyJoined {
                lottery: lottery_id,
                user: participant.user_id,
            });
        }
        entries.push(participant);
        if let Some(row) = inner.lotteries.get_mut(&lottery_id) {
            row.revision += 1;
        }
        Ok(())
    }

    fn participants_of(&self, id: &LotteryId) -> Result<Vec<Participant>> {
        let inner = self.read()?;
        if !inner.lotteries.contains_key(id) {
            return Err(RaffleError::NotFound(id.clone()));
        }
        Ok(inner.participants.get(id).cloned().unwrap_or_default())
    }

    fn commit_draw(
        &self,
        id: &LotteryId,
        expected_revision: u64,
        commit: DrawCommit,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let row = inner
            .lotteries
            .get(id)
            .ok_or_else(|| RaffleError::NotFound(id.clone()))?;

        if row.lottery.is_settled() {
            return Err(RaffleError::AlreadyDrawn(id.clone()));
        }
        if row.revision != expected_revision {
            return Err(RaffleError::RevisionConflict(id.clone()));
        }

        // Validate the full commit before mutating anything, so a bad
        // commit leaves the store untouched.
        let new_status = match &commit {
            DrawCommit::Empty { drawn_at } => {
                let populated = inner
                    .participants
                    .get(id)
                    .map(|entries| !entries.is_empty())
                    .unwrap_or(false);
                if populated {
                    return Err(RaffleError::Storage(format!(
                        "empty settlement for lottery {} with participants present",
                        id
                    )));
                }
                LotteryStatus::DrawnEmpty {
                    drawn_at: *drawn_at,
                }
            }
            DrawCommit::Winners {
                winner_ids,
                drawn_at,
            } => {
                if winner_ids.is_empty() {
                    return Err(RaffleError::Storage(format!(
                        "settlement for lottery {} names no winners",
                        id
                    )));
                }
                let entries = inner.participants.get(id).cloned().unwrap_or_default();
                for winner in winner_ids {
                    let member = entries.iter().find(|p| &p.user_id == winner);
                    match member {
                        None => {
                            return Err(RaffleError::Storage(format!(
                                "winner {} is not a participant of lottery {}",
                                winner, id
                            )))
                        }
                        Some(p) if p.winner => {
                            return Err(RaffleError::Storage(format!(
                                "participant {} of lottery {} is already a winner",
                                winner, id
                            )))
                        }
                        Some(_) => {}
                    }
                }
                let mut deduped = winner_ids.clone();
                deduped.sort();
                deduped.dedup();
                if deduped.len() != winner_ids.len() {
                    return Err(RaffleError::Storage(format!(
                        "settlement for lottery {} names a winner twice",
                        id
                    )));
                }
                LotteryStatus::Drawn {
                    winner_count: winner_ids.len() as u32,
                    drawn_at: *drawn_at,
                }
            }
        };

        // Point of no return: both halves under the same lock.
        if let DrawCommit::Winners { winner_ids, .. } = &commit {
            if let Some(entries) = inner.participants.get_mut(id) {
                for p in entries.iter_mut() {
                    if winner_ids.contains(&p.user_id) {
                        p.winner = true;
                    }
                }
            }
        }
        let row = inner
            .lotteries
            .get_mut(id)
            .ok_or_else(|| RaffleError::NotFound(id.clone()))?;
        row.lottery.status = new_status;
        row.revision += 1;
        Ok(())
    }
}

/// Assemble a [`DrawResult`] from settled storage state. Reads the stored
/// winner set back rather than recomputing it.
pub fn read_settled_result(
    lottery: &Lottery,
    participants: &[Participant],
) -> Result<DrawResult> {
    match lottery.status {
        LotteryStatus::Open => Err(RaffleError::Storage(format!(
            "lottery {} is not settled",
            lottery.id
        ))),
        LotteryStatus::Drawn {
            winner_count,
            drawn_at,
        } => Ok(DrawResult {
            lottery_id: lottery.id.clone(),
            winner_count,
            winner_ids: participants
                .iter()
                .filter(|p| p.winner)
                .map(|p| p.user_id.clone())
                .collect(),
            no_participants: false,
            drawn_at,
        }),
        LotteryStatus::DrawnEmpty { drawn_at } => Ok(DrawResult {
            lottery_id: lottery.id.clone(),
            winner_count: 0,
            winner_ids: Vec::new(),
            no_participants: true,
            drawn_at,
        }),
    }
}
