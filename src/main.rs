use std::time::Duration;

use thread_votes::config::Config;
use thread_votes::database::{create_pool, run_migrations};
use thread_votes::services::background_jobs::BackgroundJobsService;
use thread_votes::store::PgVoteRepository;
use thread_votes::{AppState, create_app};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thread_votes=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database connection pool
    let db = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database connection pool created");

    // Run migrations
    run_migrations(&db).await?;
    tracing::info!("Database migrations completed");

    // Create application state
    let state = AppState::new(PgVoteRepository::new(db), config.clone());

    if config.score_repair_interval_secs > 0 {
        BackgroundJobsService::new(
            state.votes.clone(),
            Duration::from_secs(config.score_repair_interval_secs),
        )
        .start_all_jobs();
    }

    // Create application
    let app = create_app(state);

    // Create listener
    let listener = TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;
    tracing::info!("Server listening on {}:{}", config.host, config.port);

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
