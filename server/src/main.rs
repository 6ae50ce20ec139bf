use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use turf_server::config::Config;
use turf_server::routes::create_routes;
use turf_server::state::AppState;
use turf_server::store::PgStore;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("turf_server=info,tower_http=info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), String> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .map_err(|e| format!("Failed to connect to database: {e}"))?;

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| format!("Failed to run migrations: {e}"))?;

    tracing::info!("Migrations run successfully");

    let state = AppState::new(&config, Arc::new(PgStore::new(pool)));
    let app: Router = create_routes(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {e}", config.bind_addr))?;
    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server failed: {e}"))
}
