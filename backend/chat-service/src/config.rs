use crate::error::AppError;
use dotenvy::dotenv;
use std::env;

/// Which persistence backend the stores run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::Config(format!("unknown CHAT_STORE '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    pub identity_service_url: Option<String>,
    pub max_message_length: usize,
    pub ws: WsConfig,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let store = match env::var("CHAT_STORE") {
            Ok(value) => StoreBackend::parse(&value)?,
            Err(_) => StoreBackend::Postgres,
        };

        let database_url = non_empty("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config("DATABASE_URL missing".into()));
        }

        let jwt_secret =
            non_empty("JWT_SECRET").ok_or_else(|| AppError::Config("JWT_SECRET missing".into()))?;

        let max_message_length = parse_or("CHAT_MAX_MESSAGE_LENGTH", 5000usize);
        if max_message_length == 0 {
            return Err(AppError::Config(
                "CHAT_MAX_MESSAGE_LENGTH must be positive".into(),
            ));
        }

        Ok(Self {
            store,
            database_url,
            redis_url: non_empty("REDIS_URL"),
            port: parse_or("PORT", 8085),
            jwt_secret,
            identity_service_url: non_empty("IDENTITY_SERVICE_URL"),
            max_message_length,
            ws: WsConfig {
                heartbeat_interval_secs: parse_or("WS_HEARTBEAT_INTERVAL_SECS", 5),
                client_timeout_secs: parse_or("WS_CLIENT_TIMEOUT_SECS", 30),
            },
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            store: StoreBackend::Memory,
            database_url: None,
            redis_url: None,
            port: 8085,
            jwt_secret: "test-secret".into(),
            identity_service_url: None,
            max_message_length: 5000,
            ws: WsConfig {
                heartbeat_interval_secs: 5,
                client_timeout_secs: 30,
            },
        }
    }
}
