use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{ScoreRepair, Thread, VoteSnapshot, VoteValue},
    store::{ScoreAggregator, UnitOfWork, VoteRepository, VoteStore},
};

/// The only writer of votes and thread totals.
///
/// Every vote change is applied as one unit of work: ledger upsert, then
/// delta on the thread total, then commit. A failure at any step drops the
/// unit of work and leaves both untouched.
#[derive(Clone)]
pub struct VoteReconciler<R> {
    repo: R,
}

impl<R: VoteRepository> VoteReconciler<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Record `value` as `user_id`'s vote on `thread_id`.
    ///
    /// A conflict is retried once; every other error is returned as-is.
    pub async fn cast_vote(
        &self,
        user_id: Uuid,
        thread_id: Uuid,
        value: VoteValue,
    ) -> Result<VoteSnapshot> {
        match self.try_cast_vote(user_id, thread_id, value).await {
            Err(AppError::Conflict(reason)) => {
                tracing::warn!(
                    %user_id,
                    %thread_id,
                    %reason,
                    "Vote transaction conflicted, retrying once"
                );
                self.try_cast_vote(user_id, thread_id, value).await
            }
            result => result,
        }
    }

    async fn try_cast_vote(
        &self,
        user_id: Uuid,
        thread_id: Uuid,
        value: VoteValue,
    ) -> Result<VoteSnapshot> {
        let mut tx = self.repo.begin().await?;

        if tx.find_thread(thread_id).await?.is_none() {
            return Err(AppError::NotFound("Thread not found".to_string()));
        }

        let change = tx.upsert_vote(user_id, thread_id, value).await?;
        let votes = tx.apply_delta(thread_id, change.delta()).await?;
        tx.commit().await?;

        tracing::debug!(
            %user_id,
            %thread_id,
            prior = ?change.prior,
            applied = ?change.applied,
            delta = change.delta(),
            votes,
            "Vote applied"
        );

        Ok(VoteSnapshot {
            vote: change.applied,
            votes,
        })
    }

    /// The caller's vote and the thread's last committed total.
    pub async fn current_score(&self, user_id: Uuid, thread_id: Uuid) -> Result<VoteSnapshot> {
        let votes = self
            .repo
            .thread_score(thread_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))?;
        let vote = self.repo.user_vote(user_id, thread_id).await?;

        Ok(VoteSnapshot { vote, votes })
    }

    /// Check a client's total against the thread and return the thread.
    ///
    /// Nothing is written: `reported` and any drift between the stored total
    /// and the vote ledger are only logged. Drift is fixed by
    /// [`VoteReconciler::repair_all`].
    pub async fn sync_score(&self, thread_id: Uuid, reported: i64) -> Result<Thread> {
        let mut tx = self.repo.begin().await?;
        let thread = tx
            .find_thread(thread_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))?;
        let expected = tx.ledger_total(thread_id).await?;
        drop(tx);

        if expected != thread.votes {
            tracing::warn!(
                %thread_id,
                stored = thread.votes,
                expected,
                "Thread score drifted from vote ledger"
            );
        }
        if reported != thread.votes {
            tracing::debug!(
                %thread_id,
                reported,
                authoritative = thread.votes,
                "Client-reported score differs from server"
            );
        }

        Ok(thread)
    }

    /// Recompute every thread total and return the ones that had drifted.
    pub async fn repair_all(&self) -> Result<Vec<ScoreRepair>> {
        let mut repairs = Vec::new();

        for thread_id in self.repo.thread_ids().await? {
            let mut tx = self.repo.begin().await?;
            let repair = match tx.recompute(thread_id).await {
                Ok(repair) => repair,
                // Deleted since listing.
                Err(AppError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            tx.commit().await?;

            if repair.drifted() {
                repairs.push(repair);
            }
        }

        Ok(repairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::{MemoryVoteRepository, memory::InjectedFault},
        test_support::seeded_repo,
    };
    use futures::future::join_all;

    async fn reconciler(votes: i64, users: usize) -> (VoteReconciler<MemoryVoteRepository>, Uuid, Vec<Uuid>) {
        let (repo, thread_id, users) = seeded_repo(votes, users).await;
        (VoteReconciler::new(repo), thread_id, users)
    }

    #[tokio::test]
    async fn up_then_reverse_then_repeat() {
        let (votes, thread_id, users) = reconciler(5, 1).await;
        let user = users[0];

        let first = votes.cast_vote(user, thread_id, VoteValue::Up).await.unwrap();
        assert_eq!(first, VoteSnapshot { vote: VoteValue::Up, votes: 6 });

        let reversed = votes.cast_vote(user, thread_id, VoteValue::Down).await.unwrap();
        assert_eq!(reversed, VoteSnapshot { vote: VoteValue::Down, votes: 4 });

        let repeated = votes.cast_vote(user, thread_id, VoteValue::Down).await.unwrap();
        assert_eq!(repeated, VoteSnapshot { vote: VoteValue::Down, votes: 4 });
    }

    #[tokio::test]
    async fn clearing_a_vote_removes_its_contribution() {
        let (votes, thread_id, users) = reconciler(0, 1).await;
        votes.cast_vote(users[0], thread_id, VoteValue::Down).await.unwrap();

        let cleared = votes.cast_vote(users[0], thread_id, VoteValue::None).await.unwrap();
        assert_eq!(cleared, VoteSnapshot { vote: VoteValue::None, votes: 0 });
        assert_eq!(votes.repository().votes_for_thread(thread_id).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_voters_do_not_lose_updates() {
        let (votes, thread_id, users) = reconciler(0, 24).await;

        let casts = users.iter().enumerate().map(|(i, &user)| {
            let votes = votes.clone();
            let value = if i % 3 == 0 { VoteValue::Down } else { VoteValue::Up };
            tokio::spawn(async move { votes.cast_vote(user, thread_id, value).await })
        });
        for result in join_all(casts).await {
            result.unwrap().unwrap();
        }

        // 8 down, 16 up
        assert_eq!(votes.repository().thread_score(thread_id).await.unwrap(), Some(8));
        let ledger_sum: i64 = votes
            .repository()
            .votes_for_thread(thread_id)
            .await
            .iter()
            .map(|vote| i64::from(vote.value))
            .sum();
        assert_eq!(ledger_sum, 8);
    }

    #[tokio::test]
    async fn racing_votes_from_one_user_serialize() {
        let (votes, thread_id, users) = reconciler(10, 1).await;
        let user = users[0];

        let values = [VoteValue::Up, VoteValue::Down, VoteValue::Up, VoteValue::None];
        let casts = values.map(|value| {
            let votes = votes.clone();
            tokio::spawn(async move { votes.cast_vote(user, thread_id, value).await })
        });
        let mut results = Vec::new();
        for handle in casts {
            results.push(handle.await.unwrap().unwrap());
        }

        // Whatever order they committed in, the total reflects exactly one
        // live vote and it matches the stored row.
        let stored = votes.repository().user_vote(user, thread_id).await.unwrap();
        let total = votes.repository().thread_score(thread_id).await.unwrap().unwrap();
        assert_eq!(total, 10 + stored.contribution());
        assert_eq!(votes.repository().votes_for_thread(thread_id).await.len(), 1);
        assert!(results.iter().all(|snapshot| snapshot.votes == 10 + snapshot.vote.contribution()));
    }

    #[tokio::test]
    async fn failure_after_upsert_rolls_back_everything() {
        let (votes, thread_id, users) = reconciler(10, 1).await;
        votes.repository().inject_fault(InjectedFault::FailApplyDelta).await;

        let result = votes.cast_vote(users[0], thread_id, VoteValue::Up).await;
        assert!(matches!(result, Err(AppError::Internal(_))));

        assert!(votes.repository().votes_for_thread(thread_id).await.is_empty());
        assert_eq!(votes.repository().thread_score(thread_id).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn conflict_is_retried_once() {
        let (votes, thread_id, users) = reconciler(2, 1).await;
        votes.repository().inject_fault(InjectedFault::ConflictOnUpsert).await;

        let snapshot = votes.cast_vote(users[0], thread_id, VoteValue::Up).await.unwrap();
        assert_eq!(snapshot, VoteSnapshot { vote: VoteValue::Up, votes: 3 });
    }

    #[tokio::test]
    async fn second_conflict_is_returned() {
        let (votes, thread_id, users) = reconciler(2, 1).await;
        let repo = votes.repository();
        repo.inject_fault(InjectedFault::ConflictOnUpsert).await;
        repo.inject_fault(InjectedFault::ConflictOnUpsert).await;

        let result = votes.cast_vote(users[0], thread_id, VoteValue::Up).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(repo.thread_score(thread_id).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn missing_thread_is_not_found() {
        let (votes, _, users) = reconciler(0, 1).await;
        let result = votes.cast_vote(users[0], Uuid::new_v4(), VoteValue::Up).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn current_score_reports_callers_vote() {
        let (votes, thread_id, users) = reconciler(7, 2).await;
        votes.cast_vote(users[0], thread_id, VoteValue::Down).await.unwrap();

        let mine = votes.current_score(users[0], thread_id).await.unwrap();
        assert_eq!(mine, VoteSnapshot { vote: VoteValue::Down, votes: 6 });

        let theirs = votes.current_score(users[1], thread_id).await.unwrap();
        assert_eq!(theirs, VoteSnapshot { vote: VoteValue::None, votes: 6 });
    }

    #[tokio::test]
    async fn sync_score_returns_server_total_without_writing() {
        let (votes, thread_id, users) = reconciler(0, 2).await;
        votes.cast_vote(users[0], thread_id, VoteValue::Up).await.unwrap();
        votes.cast_vote(users[1], thread_id, VoteValue::Up).await.unwrap();

        let thread = votes.sync_score(thread_id, 17).await.unwrap();
        assert_eq!(thread.votes, 2);

        votes.repository().overwrite_score(thread_id, 99).await;
        let drifted = votes.sync_score(thread_id, 2).await.unwrap();
        assert_eq!(drifted.votes, 99);
        assert_eq!(votes.repository().thread_score(thread_id).await.unwrap(), Some(99));
    }

    #[tokio::test]
    async fn imported_score_survives_sync_and_repair() {
        let (votes, thread_id, users) = reconciler(5, 1).await;
        let cast = votes.cast_vote(users[0], thread_id, VoteValue::Up).await.unwrap();
        assert_eq!(cast.votes, 6);

        let thread = votes.sync_score(thread_id, 6).await.unwrap();
        assert_eq!(thread.votes, 6);
        assert!(votes.repair_all().await.unwrap().is_empty());
        assert_eq!(votes.repository().thread_score(thread_id).await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn sync_score_on_unknown_thread_is_not_found() {
        let (votes, _, _) = reconciler(0, 0).await;
        let result = votes.sync_score(Uuid::new_v4(), 0).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn repair_all_reports_only_drifted_threads() {
        let (votes, thread_id, users) = reconciler(0, 1).await;
        votes.cast_vote(users[0], thread_id, VoteValue::Down).await.unwrap();
        let repairs = votes.repair_all().await.unwrap();
        assert!(repairs.is_empty());

        votes.repository().overwrite_score(thread_id, 3).await;
        let repairs = votes.repair_all().await.unwrap();
        assert_eq!(
            repairs,
            vec![ScoreRepair { thread_id, previous: 3, current: -1 }]
        );
        assert_eq!(votes.repository().thread_score(thread_id).await.unwrap(), Some(-1));
    }
}
