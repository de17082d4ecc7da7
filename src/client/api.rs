use std::{env, future::Future, time::Duration};

use serde::{Deserialize, de::DeserializeOwned};
use uuid::Uuid;

use super::ClientError;
use crate::models::{CastVoteRequest, SyncScoreRequest, Thread, ThreadResponse, VoteSnapshot, VoteValue};

/// The server endpoints the vote controller talks to.
pub trait VoteApi: Send + Sync {
    fn cast_vote(
        &self,
        thread_id: Uuid,
        vote: VoteValue,
    ) -> impl Future<Output = Result<VoteSnapshot, ClientError>> + Send + '_;

    fn fetch_score(
        &self,
        thread_id: Uuid,
    ) -> impl Future<Output = Result<VoteSnapshot, ClientError>> + Send + '_;

    fn sync_score(
        &self,
        thread_id: Uuid,
        votes: i64,
    ) -> impl Future<Output = Result<Thread, ClientError>> + Send + '_;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Self::from_lookup(|key| env::var(key))
    }

    /// Build from any key lookup shaped like [`env::var`].
    pub fn from_lookup(
        var: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self, env::VarError> {
        Ok(Self {
            base_url: var("VOTE_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            token: var("VOTE_API_TOKEN")?,
            request_timeout: Duration::from_millis(
                var("VOTE_REQUEST_TIMEOUT_MS")
                    .ok()
                    .and_then(|ms| ms.parse().ok())
                    .unwrap_or(10_000),
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct HttpVoteApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpVoteApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        return Err(ClientError::Server {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}

impl VoteApi for HttpVoteApi {
    async fn cast_vote(&self, thread_id: Uuid, vote: VoteValue) -> Result<VoteSnapshot, ClientError> {
        let response = self
            .client
            .post(format!("{}/api/votes/{}", self.base_url, thread_id))
            .bearer_auth(&self.token)
            .json(&CastVoteRequest { vote: vote.into() })
            .send()
            .await?;

        decode(response).await
    }

    async fn fetch_score(&self, thread_id: Uuid) -> Result<VoteSnapshot, ClientError> {
        let response = self
            .client
            .get(format!("{}/api/threads/{}/score", self.base_url, thread_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        decode(response).await
    }

    async fn sync_score(&self, thread_id: Uuid, votes: i64) -> Result<Thread, ClientError> {
        let response = self
            .client
            .put(format!("{}/api/threads/{}", self.base_url, thread_id))
            .bearer_auth(&self.token)
            .json(&SyncScoreRequest { votes })
            .send()
            .await?;

        let body: ThreadResponse = decode(response).await?;
        Ok(body.thread)
    }
}
