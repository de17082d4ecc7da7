use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    AppState, create_app,
    store::{MemoryVoteRepository, VoteRepository},
    test_support::{bearer_token, seeded_repo, test_config},
};

async fn app(votes: i64) -> (Router, MemoryVoteRepository, Uuid, Uuid) {
    let (repo, thread_id, users) = seeded_repo(votes, 1).await;
    let app = create_app(AppState::new(repo.clone(), test_config()));
    (app, repo, thread_id, users[0])
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user_id: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        request = request.header(
            header::AUTHORIZATION,
            format!("Bearer {}", bearer_token(user_id)),
        );
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

#[tokio::test]
async fn vote_cast_returns_vote_and_total() {
    let (app, _, thread_id, user) = app(5).await;
    let uri = format!("/api/votes/{thread_id}");

    let (status, body) = send(&app, "POST", &uri, Some(user), Some(json!({ "vote": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "vote": 1, "votes": 6 }));

    let (_, body) = send(&app, "POST", &uri, Some(user), Some(json!({ "vote": -1 }))).await;
    assert_eq!(body, json!({ "vote": -1, "votes": 4 }));

    let (_, body) = send(&app, "POST", &uri, Some(user), Some(json!({ "vote": -1 }))).await;
    assert_eq!(body, json!({ "vote": -1, "votes": 4 }));
}

#[tokio::test]
async fn out_of_range_vote_is_rejected() {
    let (app, repo, thread_id, user) = app(5).await;
    let uri = format!("/api/votes/{thread_id}");

    let (status, body) = send(&app, "POST", &uri, Some(user), Some(json!({ "vote": 2 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("vote"));
    assert!(repo.votes_for_thread(thread_id).await.is_empty());
}

#[tokio::test]
async fn undecodable_vote_values_are_bad_requests() {
    let (app, repo, thread_id, user) = app(5).await;
    let uri = format!("/api/votes/{thread_id}");

    for payload in [json!({ "vote": 40000 }), json!({ "vote": "up" }), json!({})] {
        let (status, body) = send(&app, "POST", &uri, Some(user), Some(payload.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
        assert!(body["error"].is_string(), "payload {payload}");
        assert_eq!(body["status"], 400);
    }
    assert!(repo.votes_for_thread(thread_id).await.is_empty());
}

#[tokio::test]
async fn malformed_thread_id_is_a_bad_request() {
    let (app, _, _, user) = app(5).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/votes/not-a-uuid",
        Some(user),
        Some(json!({ "vote": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, "GET", "/api/threads/42/score", Some(user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (app, _, thread_id, _) = app(5).await;
    let uri = format!("/api/votes/{thread_id}");

    let (status, body) = send(&app, "POST", &uri, None, Some(json!({ "vote": 1 }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn unknown_thread_is_not_found() {
    let (app, _, _, user) = app(5).await;
    let uri = format!("/api/votes/{}", Uuid::new_v4());

    let (status, body) = send(&app, "POST", &uri, Some(user), Some(json!({ "vote": 1 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Thread not found");
}

#[tokio::test]
async fn score_reflects_callers_vote() {
    let (app, _, thread_id, user) = app(5).await;
    send(
        &app,
        "POST",
        &format!("/api/votes/{thread_id}"),
        Some(user),
        Some(json!({ "vote": -1 })),
    )
    .await;

    let uri = format!("/api/threads/{thread_id}/score");
    let (status, body) = send(&app, "GET", &uri, Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "vote": -1, "votes": 4 }));

    let (_, body) = send(&app, "GET", &uri, Some(Uuid::new_v4()), None).await;
    assert_eq!(body, json!({ "vote": 0, "votes": 4 }));
}

#[tokio::test]
async fn score_sync_keeps_server_total() {
    let (app, repo, thread_id, user) = app(5).await;
    send(
        &app,
        "POST",
        &format!("/api/votes/{thread_id}"),
        Some(user),
        Some(json!({ "vote": 1 })),
    )
    .await;

    let uri = format!("/api/threads/{thread_id}");
    let (status, body) = send(&app, "PUT", &uri, Some(user), Some(json!({ "votes": 17 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["thread"]["id"], thread_id.to_string());
    assert_eq!(body["thread"]["votes"], 6);
    assert_eq!(repo.thread_score(thread_id).await.unwrap(), Some(6));
}

#[tokio::test]
async fn score_sync_with_malformed_body_is_a_bad_request() {
    let (app, _, thread_id, user) = app(5).await;
    let uri = format!("/api/threads/{thread_id}");

    let (status, body) = send(&app, "PUT", &uri, Some(user), Some(json!({ "votes": "many" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn health_needs_no_token() {
    let (app, _, _, _) = app(0).await;
    let (status, body) = send(&app, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
