use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

/// One row per (user, thread). Removing a vote stores `0`; rows are never
/// deleted in normal operation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub thread_id: Uuid,
    pub value: i16, // -1 for downvote, 0 for no vote, 1 for upvote
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("vote must be -1, 0 or 1 (got {0})")]
pub struct InvalidVoteValue(pub i16);

/// A user's stance on a thread. Serialized as `-1`, `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum VoteValue {
    Down,
    #[default]
    None,
    Up,
}

impl VoteValue {
    /// This vote's contribution to the thread total.
    pub fn contribution(self) -> i64 {
        i64::from(i16::from(self))
    }
}

impl TryFrom<i16> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Down),
            0 => Ok(Self::None),
            1 => Ok(Self::Up),
            other => Err(InvalidVoteValue(other)),
        }
    }
}

impl From<VoteValue> for i16 {
    fn from(value: VoteValue) -> Self {
        match value {
            VoteValue::Down => -1,
            VoteValue::None => 0,
            VoteValue::Up => 1,
        }
    }
}

/// The direction of a vote button click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn sign(self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }

    pub fn as_vote(self) -> VoteValue {
        match self {
            Direction::Up => VoteValue::Up,
            Direction::Down => VoteValue::Down,
        }
    }
}

/// Outcome of an upsert on the vote ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteChange {
    pub prior: VoteValue,
    pub applied: VoteValue,
}

impl VoteChange {
    /// Signed change in this user's contribution to the thread total.
    pub fn delta(self) -> i64 {
        self.applied.contribution() - self.prior.contribution()
    }
}

/// `{ vote, votes }` as seen by one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSnapshot {
    pub vote: VoteValue,
    pub votes: i64,
}

// Vote request
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CastVoteRequest {
    #[validate(range(min = -1, max = 1, message = "vote must be -1, 0 or 1"))]
    pub vote: i16,
}
