use crate::error::{AppError, AppResult};
use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig, PgPool};

/// Embedded schema, applied in order. Every statement is idempotent.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_create_conversations",
        include_str!("../migrations/0001_create_conversations.sql"),
    ),
    (
        "0002_create_messages",
        include_str!("../migrations/0002_create_messages.sql"),
    ),
];

pub async fn init_pool(database_url: &str) -> AppResult<PgPool> {
    let cfg = DbPoolConfig::for_url("chat-service", database_url);
    cfg.log_config();

    let pool = create_pg_pool(cfg)
        .await
        .map_err(|e| AppError::Database(format!("create pool: {e}")))?;
    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    let client = pool.get().await?;
    for (name, sql) in MIGRATIONS {
        client
            .batch_execute(sql)
            .await
            .map_err(|e| AppError::Database(format!("migration {name}: {e}")))?;
        tracing::info!(migration = %name, "applied migration");
    }
    Ok(())
}
