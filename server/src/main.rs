use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use reservation_server::booking::BookingService;
use reservation_server::config::Config;
use reservation_server::handlers::AppState;
use reservation_server::routes::create_routes;
use reservation_server::store::PgStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,reservation_server=debug,sqlx=warn")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let store = PgStore::connect(&config)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!()
        .run(store.pool())
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let state = AppState::new(BookingService::new(store));
    let app = create_routes(state, &config);

    tracing::info!(
        lock_timeout_ms = config.lock_timeout.as_millis() as u64,
        "Server running at http://{}",
        config.bind_addr
    );

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
