use anyhow::Context;
use chrono::Utc;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticket_payments::{config::Config, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ticket Payments API ({})", config.app.environment);

    let app_state = AppState::new(config.clone()).await?;

    // Таймеры брони живут только в памяти процесса
    let rearmed = app_state.scheduler.rearm_pending().await?;
    info!("Expiry re-armed for {} unpaid orders", rearmed);

    // --- Start background tasks ---

    // Подчищаем просроченные заказы, чей таймер потерялся
    let sweep_state = app_state.clone();
    let sweep_every = Duration::from_secs(config.orders.sweep_interval_seconds.max(1));
    task::spawn(async move {
        loop {
            tokio::time::sleep(sweep_every).await;
            match sweep_state.scheduler.sweep_overdue(Utc::now()).await {
                Ok(0) => {}
                Ok(expired) => info!("Sweep expired {} overdue orders", expired),
                Err(e) => error!("Expiry sweep failed: {}", e),
            }
        }
    });

    // --- Start the web server ---

    let app = router(app_state);
    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("HOST/PORT do not form a valid socket address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
