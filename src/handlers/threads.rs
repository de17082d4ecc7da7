use axum::{extract::State, response::Json};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::Result,
    extract::{AppJson, AppPath},
    models::{SyncScoreRequest, ThreadResponse, VoteSnapshot},
    store::VoteRepository,
};

/// The caller's vote and the thread's total, for rebuilding a client view.
pub async fn get_score<R: VoteRepository>(
    State(state): State<AppState<R>>,
    auth_user: AuthUser,
    AppPath(thread_id): AppPath<Uuid>,
) -> Result<Json<VoteSnapshot>> {
    let snapshot = state
        .votes
        .current_score(auth_user.user_id, thread_id)
        .await?;

    Ok(Json(snapshot))
}

pub async fn sync_score<R: VoteRepository>(
    State(state): State<AppState<R>>,
    auth_user: AuthUser,
    AppPath(thread_id): AppPath<Uuid>,
    AppJson(payload): AppJson<SyncScoreRequest>,
) -> Result<Json<ThreadResponse>> {
    tracing::debug!(
        user_id = %auth_user.user_id,
        username = %auth_user.username,
        %thread_id,
        reported = payload.votes,
        "Thread score sync requested"
    );

    let thread = state.votes.sync_score(thread_id, payload.votes).await?;

    Ok(Json(ThreadResponse { thread }))
}
