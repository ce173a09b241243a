use std::collections::HashMap;
use std::env::var;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use thiserror::Error;

use crate::{
    application::{
        handlers::{notification_manager::ManagerConfig, notification_scheduler::SchedulerConfig},
        services::broadcaster::BroadcasterConfig,
    },
    domain::events::EventKind,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Message template for a single-event notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// Key into the localisation catalog.
    Catalog(String),
    /// Literal text with `{placeholder}` substitution, same for every language.
    Text(String),
}

impl Template {
    pub fn parse(value: &str) -> Self {
        if value.starts_with("notification.template.") {
            Template::Catalog(value.to_string())
        } else {
            Template::Text(value.to_string())
        }
    }
}

/// Switches and templates for event-driven notifications.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub enabled: bool,
    /// Kinds missing from the map are disabled.
    pub events: HashMap<EventKind, bool>,
    pub templates: HashMap<EventKind, Template>,
    pub category_names: HashMap<String, String>,
    pub variant_names: HashMap<String, String>,
}

impl NotificationSettings {
    pub fn is_event_enabled(&self, kind: EventKind) -> bool {
        self.enabled && self.events.get(&kind).copied().unwrap_or(false)
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        let events = EventKind::ALL.into_iter().map(|k| (k, true)).collect();
        let templates = EventKind::ALL
            .into_iter()
            .map(|k| {
                (
                    k,
                    Template::Catalog(format!("notification.template.{}", k.as_str())),
                )
            })
            .collect();
        let category_names = [
            ("assault_rifle", "Assault Rifle"),
            ("smg", "SMG"),
            ("lmg", "LMG"),
            ("sniper", "Sniper"),
            ("marksman", "Marksman"),
            ("shotgun", "Shotgun"),
            ("pistol", "Pistol"),
            ("launcher", "Launcher"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let variant_names = [("br", "Battle Royale"), ("mp", "Multiplayer")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            enabled: true,
            events,
            templates,
            category_names,
            variant_names,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub database_url: String,
    pub db_max_connections: u32,
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub notifications: NotificationSettings,
    pub manager: ManagerConfig,
    pub broadcaster: BroadcasterConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Config, ConfigError> {
        let _ = dotenv();
        Self::from_lookup(|name| var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut notifications = NotificationSettings {
            enabled: parse_or(&lookup, "NOTIFICATIONS_ENABLED", true)?,
            ..NotificationSettings::default()
        };
        if let Some(list) = lookup("NOTIFICATION_EVENTS") {
            notifications.events = parse_event_list(&list)?;
        }

        let manager = ManagerConfig {
            batch_delay: Duration::from_millis(parse_or(&lookup, "NOTIFY_BATCH_DELAY_MS", 3000)?),
            default_language: lookup("DEFAULT_LANG").unwrap_or_else(|| "fa".to_string()),
        };

        let broadcaster = BroadcasterConfig {
            max_concurrent: parse_or(&lookup, "BROADCAST_MAX_CONCURRENT", 30)?,
            delay_between_batches: Duration::from_millis(parse_or(
                &lookup,
                "BROADCAST_BATCH_DELAY_MS",
                1000,
            )?),
            max_retries: parse_or(&lookup, "BROADCAST_MAX_RETRIES", 2)?,
            ..BroadcasterConfig::default()
        };

        let scheduler = SchedulerConfig {
            tick_interval: Duration::from_secs(parse_or(&lookup, "SCHEDULER_TICK_SECONDS", 60)?),
            error_backoff: Duration::from_secs(parse_or(
                &lookup,
                "SCHEDULER_ERROR_BACKOFF_SECONDS",
                5,
            )?),
            batch_limit: parse_or(&lookup, "SCHEDULER_BATCH_LIMIT", 50)?,
        };

        Ok(Config {
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN")
                .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?,
            telegram_api_url: lookup("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            notifications,
            manager,
            broadcaster,
            scheduler,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Comma-separated kinds to enable; every other kind is disabled.
fn parse_event_list(list: &str) -> Result<HashMap<EventKind, bool>, ConfigError> {
    let mut events: HashMap<EventKind, bool> =
        EventKind::ALL.into_iter().map(|k| (k, false)).collect();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = EventKind::from_str(item).ok_or_else(|| ConfigError::Invalid {
            name: "NOTIFICATION_EVENTS",
            value: item.to_string(),
        })?;
        events.insert(kind, true);
    }
    Ok(events)
}
