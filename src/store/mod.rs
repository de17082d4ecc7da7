//! The persistence seam for votes and materialized thread scores.
//!
//! All writes go through a [`UnitOfWork`] obtained from
//! [`VoteRepository::begin`]; dropping a unit of work without calling
//! [`UnitOfWork::commit`] rolls back every change made through it. Reads on
//! the repository itself take no locks and may trail the latest commit.

use std::future::Future;

use uuid::Uuid;

use crate::{
    error::Result,
    models::{ScoreRepair, Thread, VoteChange, VoteValue},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryVoteRepository;
pub use postgres::PgVoteRepository;

/// Durable one-vote-per-(user, thread) storage, scoped to a unit of work.
pub trait VoteStore {
    /// Set the caller's vote and report what it replaced.
    ///
    /// A missing row counts as a prior vote of `0`. Concurrent upserts on
    /// the same (user, thread) pair serialize; the last commit wins.
    fn upsert_vote(
        &mut self,
        user_id: Uuid,
        thread_id: Uuid,
        value: VoteValue,
    ) -> impl Future<Output = Result<VoteChange>> + Send + '_;
}

/// Running thread totals, scoped to a unit of work.
pub trait ScoreAggregator {
    /// Atomically add `delta` to the thread total and return the new total.
    fn apply_delta(
        &mut self,
        thread_id: Uuid,
        delta: i64,
    ) -> impl Future<Output = Result<i64>> + Send + '_;

    /// Imported score plus the sum of the thread's votes. Writes nothing.
    fn ledger_total(&mut self, thread_id: Uuid) -> impl Future<Output = Result<i64>> + Send + '_;

    /// Replace the thread total with [`ScoreAggregator::ledger_total`].
    /// Out-of-band repair only.
    fn recompute(&mut self, thread_id: Uuid) -> impl Future<Output = Result<ScoreRepair>> + Send + '_;
}

pub trait UnitOfWork: VoteStore + ScoreAggregator + Send {
    fn find_thread(&mut self, thread_id: Uuid) -> impl Future<Output = Result<Option<Thread>>> + Send + '_;

    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}

pub trait VoteRepository: Clone + Send + Sync + 'static {
    type Tx: UnitOfWork;

    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send + '_;

    /// Last committed total for a thread, `None` if the thread is unknown.
    fn thread_score(&self, thread_id: Uuid) -> impl Future<Output = Result<Option<i64>>> + Send + '_;

    fn user_vote(
        &self,
        user_id: Uuid,
        thread_id: Uuid,
    ) -> impl Future<Output = Result<VoteValue>> + Send + '_;

    fn thread_ids(&self) -> impl Future<Output = Result<Vec<Uuid>>> + Send + '_;
}
