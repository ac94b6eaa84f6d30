pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod models;
pub mod redis_client;
pub mod repository;
pub mod services;

use anyhow::Context;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use config::{Config, StorageBackend};
use repository::{
    MemoryOrderRepository, MemorySeatLedger, MemoryUserRepository, OrderRepository,
    PgOrderRepository, PgSeatLedger, PgUserRepository, SeatLedger, UserRepository,
};
use services::circuit_breaker::CircuitBreaker;
use services::expiry::ExpiryScheduler;
use services::mailer::{EmailSender, LogMailer, SmtpMailer};
use services::notifier::{LogNotifier, OrderNotifier};
use services::order_locks::OrderLocks;
use services::orders::OrderService;
use services::payme::PaymeService;
use services::pending_messages::{
    MemoryPendingMessages, PendingMessageStore, RedisPendingMessages,
};
use services::side_effects::SideEffects;
use services::telegram::TelegramNotifier;

/// Хранилища, на которых работают сервисы.
#[derive(Clone)]
pub struct Storage {
    pub orders: Arc<dyn OrderRepository>,
    pub seats: Arc<dyn SeatLedger>,
    pub users: Arc<dyn UserRepository>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Storage {
            orders: Arc::new(MemoryOrderRepository::new()),
            seats: Arc::new(MemorySeatLedger::new()),
            users: Arc::new(MemoryUserRepository::new()),
        }
    }

    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        match config.database.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                Ok(Self::in_memory())
            }
            StorageBackend::Postgres => {
                let db = database::Database::connect(&config.database).await?;

                Ok(Storage {
                    orders: Arc::new(PgOrderRepository::new(&db)),
                    seats: Arc::new(PgSeatLedger::new(&db)),
                    users: Arc::new(PgUserRepository::new(&db)),
                })
            }
        }
    }
}

// Shared state для всего приложения
pub struct AppState {
    pub config: Config,
    pub orders: Arc<OrderService>,
    pub payme: PaymeService,
    pub scheduler: Arc<ExpiryScheduler>,
}

impl AppState {
    /// Собирает состояние по конфигурации: хранилище, бот, почта.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let storage = Storage::connect(&config).await?;
        let notifier = build_notifier(&config).await?;
        let mailer = build_mailer(&config)?;
        Ok(Self::assemble(config, storage, notifier, mailer))
    }

    pub fn assemble(
        config: Config,
        storage: Storage,
        notifier: Arc<dyn OrderNotifier>,
        mailer: Arc<dyn EmailSender>,
    ) -> Arc<Self> {
        let locks = Arc::new(OrderLocks::new());
        let scheduler = Arc::new(ExpiryScheduler::new(
            storage.orders.clone(),
            storage.seats.clone(),
            locks.clone(),
        ));
        let effects = SideEffects::new(
            notifier,
            mailer,
            storage.users.clone(),
            storage.seats.clone(),
        );
        let orders = Arc::new(OrderService::new(
            storage.orders.clone(),
            storage.seats.clone(),
            storage.users,
            locks.clone(),
            scheduler.clone(),
            effects.clone(),
            config.hold_duration(),
        ));
        let payme = PaymeService::new(
            storage.orders,
            storage.seats,
            orders.clone(),
            locks,
            scheduler.clone(),
            effects,
        );

        Arc::new(Self {
            config,
            orders,
            payme,
            scheduler,
        })
    }
}

async fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn OrderNotifier>> {
    let Some(token) = config.notifier.bot_token.clone() else {
        info!("BOT_TOKEN is not set, order notifications go to the log");
        return Ok(Arc::new(LogNotifier));
    };

    let ttl = config.notifier.pending_message_ttl_seconds;
    let pending: Arc<dyn PendingMessageStore> = match &config.redis.url {
        Some(url) => {
            let redis = redis_client::RedisClient::new(url)
                .await
                .context("failed to connect to Redis")?;
            Arc::new(RedisPendingMessages::new(redis, ttl))
        }
        None => Arc::new(MemoryPendingMessages::new(ttl)),
    };

    let breaker = Arc::new(CircuitBreaker::new(
        "telegram",
        config.circuit_breaker.failure_threshold,
        config.circuit_breaker.timeout_seconds,
    ));
    Ok(Arc::new(TelegramNotifier::new(
        &config.notifier,
        token,
        pending,
        breaker,
    )?))
}

fn build_mailer(config: &Config) -> anyhow::Result<Arc<dyn EmailSender>> {
    let Some(host) = config.email.smtp_host.as_deref() else {
        info!("SMTP_HOST is not set, payment emails go to the log");
        return Ok(Arc::new(LogMailer));
    };

    let breaker = Arc::new(CircuitBreaker::new(
        "smtp",
        config.circuit_breaker.failure_threshold,
        config.circuit_breaker.timeout_seconds,
    ));
    Ok(Arc::new(SmtpMailer::new(&config.email, host, breaker)?))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Ticket Payments API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
