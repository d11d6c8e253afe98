use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use queue_cell::QueueService;
use reminder_cell::ReminderDispatcher;
use shared_config::AppConfig;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic queue API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let state = Arc::new(config);

    spawn_minute_loops(state.clone());

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Background loops: the overdue sweep keeps estimates honest, the
/// reminder pass messages patients ten minutes ahead of their call.
fn spawn_minute_loops(state: Arc<AppConfig>) {
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let service = QueueService::new(&sweep_state);
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(e) = service.overdue_sweep(&sweep_state.supabase_anon_key).await {
                error!("Overdue sweep failed: {}", e);
            }
        }
    });

    if !state.is_whatsapp_configured() {
        warn!("WhatsApp gateway not configured, reminder loop disabled");
        return;
    }

    tokio::spawn(async move {
        let dispatcher = ReminderDispatcher::new(&state);
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(e) = dispatcher
                .dispatch_due(false, &state.supabase_anon_key)
                .await
            {
                error!("Reminder dispatch failed: {}", e);
            }
        }
    });
}
