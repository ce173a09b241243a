use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::main;
use tracing_subscriber::EnvFilter;

use notifications::{
    application::{
        handlers::{
            notification_manager::{ManagerRepositories, NotificationManager},
            notification_scheduler::NotificationScheduler,
        },
        services::{broadcaster::Broadcaster, composer::MessageComposer, i18n::Catalog},
    },
    config::Config,
    infrastructure::{
        messaging::telegram::TelegramClient,
        repositories::postgres::{
            PostgresLanguageRepository, PostgresPreferenceRepository, PostgresRecipientDirectory,
            PostgresScheduledBroadcastRepository,
        },
    },
};

#[main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("notifications=info")),
        )
        .json()
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        batch_delay_ms = config.manager.batch_delay.as_millis() as u64,
        max_concurrent = config.broadcaster.max_concurrent,
        "Notification service starting"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let directory = PostgresRecipientDirectory::new(pool.clone());
    let client = TelegramClient::new(&config.telegram_api_url, &config.telegram_bot_token)?;
    let broadcaster = Broadcaster::new(config.broadcaster.clone());

    let catalog = Catalog::embedded(config.manager.default_language.clone())?;
    let composer = MessageComposer::new(Arc::new(catalog), Arc::new(config.notifications.clone()));

    let manager = NotificationManager::new(
        ManagerRepositories {
            preferences: PostgresPreferenceRepository::new(pool.clone()),
            directory: directory.clone(),
            languages: PostgresLanguageRepository::new(pool.clone()),
        },
        client.clone(),
        broadcaster.clone(),
        composer,
        config.manager.clone(),
    );

    let scheduler = NotificationScheduler::new(
        PostgresScheduledBroadcastRepository::new(pool.clone()),
        directory,
        client,
        broadcaster,
        config.scheduler.clone(),
    );
    scheduler.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    scheduler.stop().await;
    manager.flush_pending().await;
    pool.close().await;

    tracing::info!("Notification service stopped");
    Ok(())
}
