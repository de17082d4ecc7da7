pub mod auth;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;

#[cfg(test)]
mod test_support;

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post, put},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::Config, services::vote_service::VoteReconciler, store::VoteRepository};

#[derive(Clone)]
pub struct AppState<R> {
    pub votes: VoteReconciler<R>,
    pub config: Arc<Config>,
}

impl<R: VoteRepository> AppState<R> {
    pub fn new(repo: R, config: Config) -> Self {
        Self {
            votes: VoteReconciler::new(repo),
            config: Arc::new(config),
        }
    }
}

pub fn create_app<R: VoteRepository>(state: AppState<R>) -> Router {
    let origins = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    // Public routes (no auth required)
    let public_routes: Router<AppState<R>> =
        Router::new().route("/api/health", get(handlers::health::health));

    // Protected routes
    let protected_routes = Router::new()
        .route(
            "/api/votes/{thread_id}",
            post(handlers::votes::cast_vote::<R>),
        )
        .route(
            "/api/threads/{thread_id}/score",
            get(handlers::threads::get_score::<R>),
        )
        .route(
            "/api/threads/{thread_id}",
            put(handlers::threads::sync_score::<R>),
        );

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
