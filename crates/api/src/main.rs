use std::time::Duration;

use classmeet_api::{build_router, state::AppState};
use classmeet_config::Settings;
use classmeet_db::{connect, ensure_indexes};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "classmeet_api=debug,classmeet_services=debug,classmeet_db=debug,tower_http=debug"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let settings = Settings::load()?;
    info!("Starting ClassMeet API on {}:{}", settings.app.host, settings.app.port);
    info!(
        livekit_api = %settings.livekit.api_url,
        verify_webhooks = settings.livekit.verify_webhooks,
        sweep_interval_secs = settings.meeting.sweep_interval_secs,
        "Conferencing config"
    );

    // Connect to MongoDB
    let db = connect(&settings).await?;

    // Ensure indexes
    ensure_indexes(&db).await?;

    let app_state = AppState::new(db, settings.clone())?;

    // Periodic status sweep
    if settings.meeting.sweep_interval_secs > 0 {
        let meetings = app_state.meetings.clone();
        let period = Duration::from_secs(settings.meeting.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = meetings.sweep(bson::DateTime::now()).await {
                    warn!(error = %e, "Status sweep failed");
                }
            }
        });
    }

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
