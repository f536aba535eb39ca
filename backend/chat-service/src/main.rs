use actix_web::{web, App, HttpServer};
use chat_service::{
    config::{Config, StoreBackend},
    db,
    error::AppError,
    logging, metrics,
    redis_client::RedisClient,
    repository::{
        ConversationStore, InMemoryConversationStore, InMemoryMessageStore, MessageStore,
        PgConversationStore, PgMessageStore,
    },
    routes,
    services::{ChatSessionService, HttpProfileDirectory, ProfileDirectory, StaticProfileDirectory},
    state::AppState,
    websocket::{start_fanout_listener, ConnectionRegistry, DeliveryBus, RedisDeliveryBus},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

const FANOUT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Config::from_env()?;

    let (conversations, messages): (Arc<dyn ConversationStore>, Arc<dyn MessageStore>) =
        match cfg.store {
            StoreBackend::Postgres => {
                let url = cfg
                    .database_url
                    .as_deref()
                    .ok_or_else(|| AppError::Config("DATABASE_URL missing".into()))?;
                let pool = db::init_pool(url)
                    .await
                    .map_err(|e| AppError::StartServer(format!("db: {e}")))?;
                let conversations: Arc<dyn ConversationStore> =
                    Arc::new(PgConversationStore::new(pool.clone()));
                let messages: Arc<dyn MessageStore> = Arc::new(PgMessageStore::new(pool));
                (conversations, messages)
            }
            StoreBackend::Memory => {
                tracing::warn!("CHAT_STORE=memory: chat history is lost on restart");
                let conversations: Arc<dyn ConversationStore> =
                    Arc::new(InMemoryConversationStore::new());
                let messages: Arc<dyn MessageStore> =
                    Arc::new(InMemoryMessageStore::new(conversations.clone()));
                (conversations, messages)
            }
        };

    let profiles: Arc<dyn ProfileDirectory> = match &cfg.identity_service_url {
        Some(url) => Arc::new(HttpProfileDirectory::new(url.clone())?),
        None => {
            tracing::warn!("IDENTITY_SERVICE_URL not set, serving placeholder profiles");
            Arc::new(StaticProfileDirectory::permissive())
        }
    };

    let registry = ConnectionRegistry::new();
    let bus: Arc<dyn DeliveryBus> = match &cfg.redis_url {
        Some(url) => {
            let redis = RedisClient::from_url(url)
                .await
                .map_err(|e| AppError::StartServer(format!("redis: {e}")))?;
            spawn_fanout_listener(redis.clone(), registry.clone());
            Arc::new(RedisDeliveryBus::new(redis))
        }
        None => {
            tracing::info!("REDIS_URL not set, delivering to local connections only");
            Arc::new(registry.clone())
        }
    };

    let chat = ChatSessionService::new(
        conversations,
        messages,
        bus,
        profiles,
        cfg.max_message_length,
    );

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let state = AppState::new(chat, registry, cfg);
    tracing::info!(%bind_addr, "starting chat-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);
        let jwt_secret = state.config.jwt_secret.clone();

        App::new()
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(|cfg| routes::configure(cfg, &jwt_secret))
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind REST: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(format!("REST server: {e}")))
}

/// Keep the Redis fan-out alive; a dropped connection is re-established.
fn spawn_fanout_listener(redis: RedisClient, registry: ConnectionRegistry) {
    tokio::spawn(async move {
        loop {
            match start_fanout_listener(redis.clone(), registry.clone()).await {
                Ok(()) => tracing::warn!("redis fan-out stream ended, resubscribing"),
                Err(e) => tracing::error!(error = %e, "redis fan-out listener failed"),
            }
            tokio::time::sleep(FANOUT_RETRY_DELAY).await;
        }
    });
}
