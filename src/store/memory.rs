//! In-process backend.
//!
//! Units of work run one at a time against a staged copy of the ledger and
//! publish it on commit. Repository reads go to the last published copy and
//! never wait on an open unit of work.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{ScoreAggregator, UnitOfWork, VoteRepository, VoteStore};
use crate::{
    error::{AppError, Result},
    models::{ScoreRepair, Thread, Vote, VoteChange, VoteValue},
};

#[derive(Debug, Clone, Default)]
struct Ledger {
    users: HashSet<Uuid>,
    threads: HashMap<Uuid, Thread>,
    votes: HashMap<(Uuid, Uuid), Vote>,
}

/// A one-shot failure consumed by the next matching operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// The next upsert reports a duplicate-key conflict.
    ConflictOnUpsert,
    /// The next delta fails after the vote row has been written.
    FailApplyDelta,
}

#[derive(Clone, Default)]
pub struct MemoryVoteRepository {
    writer: Arc<Mutex<Ledger>>,
    published: Arc<RwLock<Ledger>>,
    faults: Arc<Mutex<VecDeque<InjectedFault>>>,
}

impl MemoryVoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: Uuid) {
        self.write(|ledger| {
            ledger.users.insert(user_id);
        })
        .await;
    }

    pub async fn add_thread(&self, thread: Thread) {
        self.write(|ledger| {
            ledger.threads.insert(thread.id, thread);
        })
        .await;
    }

    pub async fn inject_fault(&self, fault: InjectedFault) {
        self.faults.lock().await.push_back(fault);
    }

    pub async fn votes_for_thread(&self, thread_id: Uuid) -> Vec<Vote> {
        self.published
            .read()
            .await
            .votes
            .values()
            .filter(|vote| vote.thread_id == thread_id)
            .cloned()
            .collect()
    }

    /// Overwrite a materialized total without touching the votes behind it.
    #[cfg(test)]
    pub(crate) async fn overwrite_score(&self, thread_id: Uuid, votes: i64) {
        self.write(|ledger| {
            if let Some(thread) = ledger.threads.get_mut(&thread_id) {
                thread.votes = votes;
            }
        })
        .await;
    }

    async fn write(&self, apply: impl FnOnce(&mut Ledger)) {
        let mut writer = self.writer.lock().await;
        apply(&mut *writer);
        *self.published.write().await = writer.clone();
    }
}

pub struct MemoryTransaction {
    writer: OwnedMutexGuard<Ledger>,
    staged: Ledger,
    published: Arc<RwLock<Ledger>>,
    faults: Arc<Mutex<VecDeque<InjectedFault>>>,
}

impl MemoryTransaction {
    async fn take_fault(&self, fault: InjectedFault) -> bool {
        let mut faults = self.faults.lock().await;
        if faults.front() == Some(&fault) {
            faults.pop_front();
            true
        } else {
            false
        }
    }
}

impl VoteRepository for MemoryVoteRepository {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let writer = self.writer.clone().lock_owned().await;
        let staged = (*writer).clone();
        Ok(MemoryTransaction {
            writer,
            staged,
            published: self.published.clone(),
            faults: self.faults.clone(),
        })
    }

    async fn thread_score(&self, thread_id: Uuid) -> Result<Option<i64>> {
        Ok(self
            .published
            .read()
            .await
            .threads
            .get(&thread_id)
            .map(|thread| thread.votes))
    }

    async fn user_vote(&self, user_id: Uuid, thread_id: Uuid) -> Result<VoteValue> {
        let published = self.published.read().await;
        match published.votes.get(&(user_id, thread_id)) {
            Some(vote) => VoteValue::try_from(vote.value)
                .map_err(|e| AppError::Internal(format!("corrupt vote row: {e}"))),
            None => Ok(VoteValue::None),
        }
    }

    async fn thread_ids(&self) -> Result<Vec<Uuid>> {
        let published = self.published.read().await;
        let mut threads: Vec<&Thread> = published.threads.values().collect();
        threads.sort_by_key(|thread| thread.created_at);
        Ok(threads.into_iter().map(|thread| thread.id).collect())
    }
}

impl VoteStore for MemoryTransaction {
    async fn upsert_vote(
        &mut self,
        user_id: Uuid,
        thread_id: Uuid,
        value: VoteValue,
    ) -> Result<VoteChange> {
        if !self.staged.users.contains(&user_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        if !self.staged.threads.contains_key(&thread_id) {
            return Err(AppError::NotFound("Thread not found".to_string()));
        }
        if self.take_fault(InjectedFault::ConflictOnUpsert).await {
            return Err(AppError::Conflict(
                "duplicate key value violates unique constraint \"votes_user_thread_key\""
                    .to_string(),
            ));
        }

        let now = Utc::now();
        let row = self
            .staged
            .votes
            .entry((user_id, thread_id))
            .or_insert_with(|| Vote {
                id: Uuid::new_v4(),
                user_id,
                thread_id,
                value: 0,
                created_at: now,
                updated_at: now,
            });

        let prior = VoteValue::try_from(row.value)
            .map_err(|e| AppError::Internal(format!("corrupt vote row: {e}")))?;
        row.value = value.into();
        row.updated_at = now;

        Ok(VoteChange {
            prior,
            applied: value,
        })
    }
}

impl ScoreAggregator for MemoryTransaction {
    async fn apply_delta(&mut self, thread_id: Uuid, delta: i64) -> Result<i64> {
        if self.take_fault(InjectedFault::FailApplyDelta).await {
            return Err(AppError::Internal(
                "injected failure applying score delta".to_string(),
            ));
        }

        let thread = self
            .staged
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))?;
        thread.votes += delta;
        thread.updated_at = Utc::now();
        Ok(thread.votes)
    }

    async fn ledger_total(&mut self, thread_id: Uuid) -> Result<i64> {
        let imported = self
            .staged
            .threads
            .get(&thread_id)
            .map(|thread| thread.imported_votes)
            .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))?;
        let cast: i64 = self
            .staged
            .votes
            .values()
            .filter(|vote| vote.thread_id == thread_id)
            .map(|vote| i64::from(vote.value))
            .sum();

        Ok(imported + cast)
    }

    async fn recompute(&mut self, thread_id: Uuid) -> Result<ScoreRepair> {
        let current = self.ledger_total(thread_id).await?;

        let thread = self
            .staged
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))?;
        let previous = thread.votes;
        thread.votes = current;

        Ok(ScoreRepair {
            thread_id,
            previous,
            current,
        })
    }
}

impl UnitOfWork for MemoryTransaction {
    async fn find_thread(&mut self, thread_id: Uuid) -> Result<Option<Thread>> {
        Ok(self.staged.threads.get(&thread_id).cloned())
    }

    async fn commit(self) -> Result<()> {
        let MemoryTransaction {
            mut writer,
            staged,
            published,
            ..
        } = self;
        *published.write().await = staged.clone();
        *writer = staged;
        Ok(())
    }
}
