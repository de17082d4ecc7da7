use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Thread row. `votes` is the materialized score and is only written by the
/// vote transaction and the score repair path. `imported_votes` is the part
/// of the score that arrived with the thread and has no vote rows behind it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Thread {
    pub id: Uuid,
    pub subreddit: String,
    pub author: String,
    pub title: String,
    pub content: Option<String>,
    pub votes: i64,
    pub imported_votes: i64,
    pub num_comments: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Thread score sync request
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncScoreRequest {
    pub votes: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread: Thread,
}

/// A thread's stored total next to the total its vote ledger implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreRepair {
    pub thread_id: Uuid,
    pub previous: i64,
    pub current: i64,
}

impl ScoreRepair {
    pub fn drifted(&self) -> bool {
        self.previous != self.current
    }
}
