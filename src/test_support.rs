use chrono::Utc;
use uuid::Uuid;

use crate::{auth::Claims, config::Config, models::Thread, store::MemoryVoteRepository};

pub const TEST_JWT_SECRET: &str = "test-secret";

pub fn thread_with_votes(votes: i64) -> Thread {
    let now = Utc::now();
    Thread {
        id: Uuid::new_v4(),
        subreddit: "rust".to_string(),
        author: "ferris".to_string(),
        title: "Borrow checker appreciation thread".to_string(),
        content: None,
        votes,
        imported_votes: votes,
        num_comments: 0,
        created_at: now,
        updated_at: now,
    }
}

/// A repository holding one thread with a starting total and `users` voters.
pub async fn seeded_repo(votes: i64, users: usize) -> (MemoryVoteRepository, Uuid, Vec<Uuid>) {
    let repo = MemoryVoteRepository::new();
    let thread = thread_with_votes(votes);
    let thread_id = thread.id;
    repo.add_thread(thread).await;

    let mut user_ids = Vec::with_capacity(users);
    for _ in 0..users {
        let user_id = Uuid::new_v4();
        repo.add_user(user_id).await;
        user_ids.push(user_id);
    }

    (repo, thread_id, user_ids)
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        allowed_origins: vec!["http://localhost:5173".to_string()],
        db_max_connections: 1,
        score_repair_interval_secs: 0,
    }
}

pub fn bearer_token(user_id: Uuid) -> String {
    let (token, _) = Claims::new(user_id, "tester".to_string(), TEST_JWT_SECRET).unwrap();
    token
}
