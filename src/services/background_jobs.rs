use tokio::time::{Duration, interval};

use crate::{error::Result, services::vote_service::VoteReconciler, store::VoteRepository};

#[derive(Clone)]
pub struct BackgroundJobsService<R> {
    votes: VoteReconciler<R>,
    score_repair_interval: Duration,
}

impl<R: VoteRepository> BackgroundJobsService<R> {
    pub fn new(votes: VoteReconciler<R>, score_repair_interval: Duration) -> Self {
        Self {
            votes,
            score_repair_interval,
        }
    }

    /// Start all background jobs
    pub fn start_all_jobs(&self) {
        let jobs_service = self.clone();

        // Recompute thread totals from the vote ledger
        tokio::spawn(async move {
            let mut interval = interval(jobs_service.score_repair_interval);
            loop {
                interval.tick().await;
                if let Err(e) = jobs_service.repair_scores().await {
                    tracing::error!("Failed to repair thread scores: {}", e);
                }
            }
        });

        tracing::info!("Background jobs started successfully");
    }

    /// Repair drifted thread scores
    pub async fn repair_scores(&self) -> Result<usize> {
        let repairs = self.votes.repair_all().await?;
        for repair in &repairs {
            tracing::warn!(
                thread_id = %repair.thread_id,
                previous = repair.previous,
                current = repair.current,
                "Repaired drifted thread score"
            );
        }
        if !repairs.is_empty() {
            tracing::info!("Repaired {} thread scores", repairs.len());
        }
        Ok(repairs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::VoteValue, test_support::seeded_repo};

    #[tokio::test]
    async fn repair_scores_counts_corrections() {
        let (repo, thread_id, _) = seeded_repo(0, 0).await;
        repo.overwrite_score(thread_id, 12).await;
        let jobs = BackgroundJobsService::new(
            VoteReconciler::new(repo.clone()),
            Duration::from_secs(60),
        );

        assert_eq!(jobs.repair_scores().await.unwrap(), 1);
        assert_eq!(jobs.repair_scores().await.unwrap(), 0);
        assert_eq!(repo.thread_score(thread_id).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn repair_scores_leaves_imported_scores_alone() {
        let (repo, thread_id, users) = seeded_repo(12, 1).await;
        let votes = VoteReconciler::new(repo.clone());
        votes.cast_vote(users[0], thread_id, VoteValue::Down).await.unwrap();
        let jobs = BackgroundJobsService::new(votes, Duration::from_secs(60));

        assert_eq!(jobs.repair_scores().await.unwrap(), 0);
        assert_eq!(repo.thread_score(thread_id).await.unwrap(), Some(11));
    }
}
