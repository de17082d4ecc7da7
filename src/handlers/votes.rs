use axum::{extract::State, response::Json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    error::Result,
    extract::{AppJson, AppPath},
    models::{CastVoteRequest, VoteSnapshot, VoteValue},
    store::VoteRepository,
};

pub async fn cast_vote<R: VoteRepository>(
    State(state): State<AppState<R>>,
    auth_user: AuthUser,
    AppPath(thread_id): AppPath<Uuid>,
    AppJson(payload): AppJson<CastVoteRequest>,
) -> Result<Json<VoteSnapshot>> {
    // Validate vote value
    payload.validate()?;
    let value = VoteValue::try_from(payload.vote)?;

    let snapshot = state
        .votes
        .cast_vote(auth_user.user_id, thread_id, value)
        .await?;

    Ok(Json(snapshot))
}
