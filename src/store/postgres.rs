//! PostgreSQL backend.
//!
//! Votes on a pair serialize on the vote row lock (`SELECT .. FOR UPDATE`);
//! totals change through a single `UPDATE .. SET votes = votes + $delta`, so
//! concurrent voters on one thread never lose each other's deltas.

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{ScoreAggregator, UnitOfWork, VoteRepository, VoteStore};
use crate::{
    error::{AppError, Result},
    models::{ScoreRepair, Thread, VoteChange, VoteValue},
};

/// Map driver errors onto the vote error taxonomy.
fn classify(error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db) = error {
        match db.code().as_deref() {
            Some("23503") => {
                return AppError::NotFound("Referenced user or thread not found".to_string());
            }
            // unique violation, serialization failure, deadlock
            Some("23505") | Some("40001") | Some("40P01") => {
                return AppError::Conflict(db.message().to_string());
            }
            _ => {}
        }
    }
    AppError::Database(error)
}

fn stored_vote(value: i16) -> Result<VoteValue> {
    VoteValue::try_from(value).map_err(|e| AppError::Internal(format!("corrupt vote row: {e}")))
}

#[derive(Clone)]
pub struct PgVoteRepository {
    pool: PgPool,
}

impl PgVoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl VoteRepository for PgVoteRepository {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction { tx })
    }

    async fn thread_score(&self, thread_id: Uuid) -> Result<Option<i64>> {
        let votes = sqlx::query_scalar::<_, i64>("SELECT votes FROM threads WHERE id = $1")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(votes)
    }

    async fn user_vote(&self, user_id: Uuid, thread_id: Uuid) -> Result<VoteValue> {
        let value = sqlx::query_scalar::<_, i16>(
            "SELECT value FROM votes WHERE user_id = $1 AND thread_id = $2",
        )
        .bind(user_id)
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        value.map_or(Ok(VoteValue::None), stored_vote)
    }

    async fn thread_ids(&self) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM threads ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

impl VoteStore for PgTransaction {
    async fn upsert_vote(
        &mut self,
        user_id: Uuid,
        thread_id: Uuid,
        value: VoteValue,
    ) -> Result<VoteChange> {
        let now = Utc::now();

        // Seed a neutral row so the prior value can be read under a row lock,
        // even when two first votes race.
        sqlx::query(
            r#"
            INSERT INTO votes (id, user_id, thread_id, value, created_at, updated_at)
            VALUES ($1, $2, $3, 0, $4, $4)
            ON CONFLICT (user_id, thread_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(thread_id)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        let prior = sqlx::query_scalar::<_, i16>(
            "SELECT value FROM votes WHERE user_id = $1 AND thread_id = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(thread_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;

        let applied = sqlx::query_scalar::<_, i16>(
            r#"
            UPDATE votes SET value = $3, updated_at = $4
            WHERE user_id = $1 AND thread_id = $2
            RETURNING value
            "#,
        )
        .bind(user_id)
        .bind(thread_id)
        .bind(i16::from(value))
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(VoteChange {
            prior: stored_vote(prior)?,
            applied: stored_vote(applied)?,
        })
    }
}

impl ScoreAggregator for PgTransaction {
    async fn apply_delta(&mut self, thread_id: Uuid, delta: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE threads SET votes = votes + $2, updated_at = NOW() WHERE id = $1 RETURNING votes",
        )
        .bind(thread_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?
        .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))
    }

    async fn ledger_total(&mut self, thread_id: Uuid) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT imported_votes
                 + (SELECT COALESCE(SUM(value), 0)::BIGINT FROM votes WHERE thread_id = $1)
            FROM threads
            WHERE id = $1
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?
        .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))
    }

    async fn recompute(&mut self, thread_id: Uuid) -> Result<ScoreRepair> {
        // Holding the thread row lock makes in-flight deltas wait for the
        // recomputed total instead of racing it.
        let previous =
            sqlx::query_scalar::<_, i64>("SELECT votes FROM threads WHERE id = $1 FOR UPDATE")
                .bind(thread_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(classify)?
                .ok_or_else(|| AppError::NotFound("Thread not found".to_string()))?;

        let current = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE threads
            SET votes = imported_votes
                      + (SELECT COALESCE(SUM(value), 0)::BIGINT FROM votes WHERE thread_id = $1)
            WHERE id = $1
            RETURNING votes
            "#,
        )
        .bind(thread_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(ScoreRepair {
            thread_id,
            previous,
            current,
        })
    }
}

impl UnitOfWork for PgTransaction {
    async fn find_thread(&mut self, thread_id: Uuid) -> Result<Option<Thread>> {
        let thread = sqlx::query_as::<_, Thread>(
            r#"
            SELECT id, subreddit, author, title, content, votes, imported_votes,
                   num_comments, created_at, updated_at
            FROM threads
            WHERE id = $1
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;
        Ok(thread)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(classify)
    }
}
