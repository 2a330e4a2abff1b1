//! Raffle platform core.
//!
//! Users join time-boxed lotteries; at expiry, winners are selected fairly
//! and atomically from the participant pool. The modules here implement the
//! draw lifecycle: the state machine from creation through expiry to
//! settlement, the exactly-once draw guarantee under concurrent triggers
//! (scheduled sweep, manual owner/admin trigger, lazy read-time trigger),
//! and uniform random winner selection with at-most-once membership.
//!
//! The storage boundary is the [`store::LotteryStore`] trait; everything
//! above it is storage-agnostic. The only requirement placed on a real
//! backend is an atomic conditional write for the settlement commit and a
//! conditional insert for join uniqueness.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod clock;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod service;
pub mod store;

pub use clock::{is_expired, Clock, ManualClock, SystemClock, TimestampMs};
pub use config::RaffleConfig;
pub use engine::{DrawEngine, DrawOutcome, DrawResult, DrawTrigger};
pub use metrics::RaffleMetrics;
pub use registry::ParticipantRegistry;
pub use scheduler::{DrawScheduler, SweepItem, SweepReport, SweepRunner, SweepStatus};
pub use selector::{UniformSelector, WinnerSelector};
pub use service::{CreateLottery, LotteryDetail, LotteryPage, RaffleService};
pub use store::{DrawCommit, InMemoryLotteryStore, LotteryStore, VersionedLottery};

/// Opaque lottery identifier, assigned at creation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LotteryId(pub String);

impl LotteryId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        use rand::{distributions::Alphanumeric, Rng};
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect();
        Self(id)
    }
}

impl fmt::Display for LotteryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a user (creator or participant), supplied by the excluded
/// authentication layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability record for an authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    /// Admins may create lotteries and draw any lottery.
    pub admin: bool,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            admin: true,
        }
    }
}

/// Settlement state of a lottery.
///
/// Modeled as a single tagged variant: `winner_count` and `drawn_at` exist
/// only once the lottery is settled, so an undrawn lottery cannot carry
/// stale or partially written settlement fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotteryStatus {
    /// Accepting joins (until expiry) and awaiting settlement.
    Open,
    /// Settled with `winner_count > 0` winners.
    Drawn {
        winner_count: u32,
        drawn_at: TimestampMs,
    },
    /// Settled with zero participants at draw time.
    DrawnEmpty { drawn_at: TimestampMs },
}

/// A time-boxed drawing with a fixed prize count and a single settlement
/// event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lottery {
    pub id: LotteryId,
    pub title: String,
    pub description: String,
    /// Creator. May manually draw; may not redraw.
    pub owner: UserId,
    /// Single authoritative end instant, fixed at the write boundary.
    pub end_at: TimestampMs,
    /// Positive, fixed at creation.
    pub prize_count: u32,
    pub created_at: TimestampMs,
    pub status: LotteryStatus,
}

impl Lottery {
    /// Whether the lottery has reached a terminal settled state.
    pub fn is_settled(&self) -> bool {
        !matches!(self.status, LotteryStatus::Open)
    }

    /// Winner count, once settled.
    pub fn winner_count(&self) -> Option<u32> {
        match self.status {
            LotteryStatus::Open => None,
            LotteryStatus::Drawn { winner_count, .. } => Some(winner_count),
            LotteryStatus::DrawnEmpty { .. } => Some(0),
        }
    }

    /// Settlement instant, once settled.
    pub fn drawn_at(&self) -> Option<TimestampMs> {
        match self.status {
            LotteryStatus::Open => None,
            LotteryStatus::Drawn { drawn_at, .. } => Some(drawn_at),
            LotteryStatus::DrawnEmpty { drawn_at } => Some(drawn_at),
        }
    }

    /// Whether the lottery settled with zero participants.
    pub fn settled_empty(&self) -> bool {
        matches!(self.status, LotteryStatus::DrawnEmpty { .. })
    }
}

/// Membership of a user in a lottery. The composite `(lottery_id, user_id)`
/// identity is unique, enforcing at-most-once join.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub lottery_id: LotteryId,
    pub user_id: UserId,
    pub joined_at: TimestampMs,
    /// Set true only by the settlement commit, only once, only for the
    /// chosen subset.
    pub winner: bool,
}

/// Unified error type for raffle core operations.
#[derive(Debug, Error)]
pub enum RaffleError {
    // Validation errors: rejected before persistence, never retried.
    #[error("invalid title: {0}")]
    InvalidTitle(String),

    #[error("invalid description: {0}")]
    InvalidDescription(String),

    #[error("invalid end time {end_at}: must be after {now}")]
    InvalidEndTime { end_at: TimestampMs, now: TimestampMs },

    #[error("invalid prize count {got}: must be between 1 and {max}")]
    InvalidPrizeCount { got: u32, max: u32 },

    // Authorization errors: no state change, never retried.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("lottery {0} not found")]
    NotFound(LotteryId),

    // Conflict errors: another actor already reached the desired end state.
    #[error("user {user} already joined lottery {lottery}")]
    AlreadyJoined { lottery: LotteryId, user: UserId },

    #[error("lottery {0} is closed to new participants")]
    LotteryClosed(LotteryId),

    #[error("lottery {0} is already drawn")]
    AlreadyDrawn(LotteryId),

    #[error("lottery {0} has no participants")]
    NoParticipants(LotteryId),

    #[error("lottery {0} has not expired yet")]
    NotExpired(LotteryId),

    // Transient errors: safe to retry against fresh state.
    #[error("revision conflict on lottery {0}: concurrent writer")]
    RevisionConflict(LotteryId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RaffleError {
    /// Whether a caller may safely retry the failed operation. Conflict
    /// outcomes are deliberately not retryable: they mean another actor
    /// already achieved the desired end state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RevisionConflict(_) | Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, RaffleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = LotteryId::generate();
        let b = LotteryId::generate();
        assert_ne!(a, b);
        assert_eq!(a.0.len(), 20);
    }

    #[test]
    fn settlement_accessors() {
        let mut lottery = Lottery {
            id: LotteryId("l1".into()),
            title: "t".into(),
            description: "d".into(),
            owner: UserId("owner".into()),
            end_at: TimestampMs(1_000),
            prize_count: 2,
            created_at: TimestampMs(500),
            status: LotteryStatus::Open,
        };
        assert!(!lottery.is_settled());
        assert_eq!(lottery.winner_count(), None);
        assert_eq!(lottery.drawn_at(), None);

        lottery.status = LotteryStatus::Drawn {
            winner_count: 2,
            drawn_at: TimestampMs(2_000),
        };
        assert!(lottery.is_settled());
        assert!(!lottery.settled_empty());
        assert_eq!(lottery.winner_count(), Some(2));
        assert_eq!(lottery.drawn_at(), Some(TimestampMs(2_000)));

        lottery.status = LotteryStatus::DrawnEmpty {
            drawn_at: TimestampMs(2_000),
        };
        assert!(lottery.settled_empty());
        assert_eq!(lottery.winner_count(), Some(0));
    }

    #[test]
    fn retryable_classification() {
        assert!(RaffleError::RevisionConflict(LotteryId("x".into())).is_retryable());
        assert!(RaffleError::Storage("timeout".into()).is_retryable());
        assert!(!RaffleError::AlreadyDrawn(LotteryId("x".into())).is_retryable());
        assert!(!RaffleError::Unauthorized("nope".into()).is_retryable());
        assert!(!RaffleError::AlreadyJoined {
            lottery: LotteryId("x".into()),
            user: UserId("u".into()),
        }
        .is_retryable());
    }
}
