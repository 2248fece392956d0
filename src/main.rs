//! notification-hub server binary.
//!
//! Startup order:
//! 1. Load and validate configuration (any error stops startup)
//! 2. Install tracing
//! 3. Build every service explicitly and start the background tasks
//! 4. Serve HTTP/WebSocket until Ctrl-C, then drain and stop

use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notification_hub::adapters::auth::TrustedHeaderSessionResolver;
use notification_hub::adapters::delivery::{
    DeliveryQueue, DeliveryWorkerPool, InMemoryJobStore, RedisJobStore,
};
use notification_hub::adapters::email::{
    EmailChannelSender, EmailDeliveryHandler, HttpMailTransport, InMemoryCircuitBreaker,
};
use notification_hub::adapters::http::{
    health_router, notifications_router, HealthState, NotificationsState,
};
use notification_hub::adapters::persistence::InMemoryNotificationRepository;
use notification_hub::adapters::pubsub::{PubSubBridge, RedisBroker};
use notification_hub::adapters::rate_limiter::InMemoryRateLimiter;
use notification_hub::adapters::websocket::{
    websocket_router, ConnectionRegistry, EventRouter, WebSocketState,
};
use notification_hub::application::NotificationService;
use notification_hub::config::{AppConfig, ServerConfig};
use notification_hub::ports::{JobStore, SessionResolver};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.server);

    let server_id = config.server.server_id();
    tracing::info!(
        server_id = %server_id,
        environment = ?config.server.environment,
        "Starting notification hub"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    // Live delivery
    let registry = Arc::new(ConnectionRegistry::new());
    let queue_config = config.delivery.queue_config();
    let (router, job_store): (EventRouter, Arc<dyn JobStore>) = match config.redis.url() {
        Some(url) => {
            let broker = Arc::new(RedisBroker::new(url, config.redis.timeout())?);
            let bridge = Arc::new(PubSubBridge::new(
                broker,
                registry.clone(),
                server_id.clone(),
            ));
            background.push((
                "pubsub bridge",
                tokio::spawn(bridge.clone().run(shutdown_rx.clone())),
            ));
            let store = RedisJobStore::new(url, &queue_config.queue_name, config.redis.timeout())?;
            (
                EventRouter::new(registry.clone(), bridge),
                Arc::new(store) as Arc<dyn JobStore>,
            )
        }
        None => {
            tracing::warn!("No Redis URL configured; running single-instance with in-memory job store");
            (
                EventRouter::local_only(registry.clone()),
                Arc::new(InMemoryJobStore::new()) as Arc<dyn JobStore>,
            )
        }
    };
    let router = Arc::new(router);

    let ws_config = &config.websocket;
    let limiter = Arc::new(InMemoryRateLimiter::new(
        ws_config.messages_per_window,
        ws_config.window(),
    ));
    background.push((
        "rate limit sweeper",
        limiter
            .clone()
            .spawn_sweeper(ws_config.sweep_interval(), shutdown_rx.clone()),
    ));

    // Durable delivery
    let queue = Arc::new(DeliveryQueue::new(queue_config, job_store));
    let restored = queue.restore().await?;
    tracing::info!(restored, "Delivery queue restored");

    let breaker = Arc::new(InMemoryCircuitBreaker::new(config.delivery.breaker_config()));
    let transport = Arc::new(HttpMailTransport::new(config.email.transport_config()?)?);
    let sender = Arc::new(EmailChannelSender::new(
        transport,
        breaker.clone(),
        config.email.sender_config(&config.server.app_url),
    ));
    let pool = DeliveryWorkerPool::start(
        queue.clone(),
        Arc::new(EmailDeliveryHandler::new(sender)),
        config.delivery.worker_config(),
    );

    // Application
    let repository = Arc::new(InMemoryNotificationRepository::new());
    let service = Arc::new(NotificationService::new(
        repository,
        router.clone(),
        queue.clone(),
    ));
    let sessions: Arc<dyn SessionResolver> = Arc::new(TrustedHeaderSessionResolver::default());

    let app = Router::new()
        .merge(websocket_router().with_state(WebSocketState::new(
            router.clone(),
            limiter,
            sessions.clone(),
            ws_config.channel_capacity,
        )))
        .merge(health_router().with_state(HealthState {
            router,
            queue,
            breaker,
        }))
        .merge(notifications_router().with_state(NotificationsState { service, sessions }))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_ctrl_c())
        .await?;

    let _ = shutdown_tx.send(true);
    pool.shutdown().await;
    for (name, task) in background {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Background task panicked");
        }
    }

    tracing::info!("Notification hub stopped");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if server.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
