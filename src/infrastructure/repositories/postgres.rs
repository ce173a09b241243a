use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres, types::Json};
use tokio_stream::StreamExt;

use crate::domain::{
    events::EventKind,
    models::{BroadcastKind, RecipientId, RecipientPreference, RenderMode, ScheduledBroadcast},
    repositories::{
        LanguageRepository, PreferenceRepository, RecipientDirectory,
        ScheduledBroadcastRepository,
    },
};

pub type PgPool = Pool<Postgres>;

#[derive(Clone)]
pub struct PostgresRecipientDirectory {
    pool: PgPool,
}

impl PostgresRecipientDirectory {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl RecipientDirectory for PostgresRecipientDirectory {
    async fn all_recipients(&self) -> anyhow::Result<Vec<RecipientId>> {
        let mut rows = sqlx::query_scalar::<_, i64>(
            r#"SELECT user_id FROM subscribers WHERE is_active = TRUE ORDER BY subscribed_at"#,
        )
        .fetch(&self.pool);

        let mut recipients = Vec::new();
        while let Some(user_id) = rows.next().await {
            recipients.push(RecipientId(user_id?));
        }
        Ok(recipients)
    }

    async fn remove(&self, recipient: RecipientId) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET is_active = FALSE
            WHERE user_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(recipient.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PostgresPreferenceRepository {
    pool: PgPool,
}

impl PostgresPreferenceRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl PreferenceRepository for PostgresPreferenceRepository {
    async fn resolve_recipients(
        &self,
        kinds: &[EventKind],
        variant: &str,
    ) -> anyhow::Result<Option<HashSet<RecipientId>>> {
        let kinds: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
        // Mirrors RecipientPreference::wants: no row, or enabled with the
        // variant selected and at least one kind not switched off.
        let rows = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT s.user_id
            FROM subscribers s
            LEFT JOIN user_preferences up ON up.user_id = s.user_id
            WHERE s.is_active = TRUE
              AND (
                up.user_id IS NULL
                OR (
                    COALESCE((up.preferences->>'enabled')::boolean, TRUE)
                    AND COALESCE(up.preferences->'modes', '["br","mp"]'::jsonb) ? $1
                    AND EXISTS (
                        SELECT 1
                        FROM unnest($2::text[]) AS kind
                        WHERE COALESCE((up.preferences->'events'->>kind)::boolean, TRUE)
                    )
                )
              )
            "#,
        )
        .bind(variant)
        .bind(kinds)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(rows.into_iter().map(RecipientId).collect()))
    }

    async fn get_preference(
        &self,
        recipient: RecipientId,
    ) -> anyhow::Result<Option<RecipientPreference>> {
        let record = sqlx::query_scalar::<_, Json<RecipientPreference>>(
            r#"SELECT preferences FROM user_preferences WHERE user_id = $1"#,
        )
        .bind(recipient.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(|Json(pref)| pref))
    }

    async fn save_preference(
        &self,
        recipient: RecipientId,
        preference: &RecipientPreference,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, preferences, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET preferences = EXCLUDED.preferences,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(recipient.0)
        .bind(Json(preference))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PostgresLanguageRepository {
    pool: PgPool,
}

impl PostgresLanguageRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl LanguageRepository for PostgresLanguageRepository {
    async fn get_language(&self, recipient: RecipientId) -> anyhow::Result<Option<String>> {
        let language = sqlx::query_scalar::<_, Option<String>>(
            r#"SELECT language FROM users WHERE user_id = $1"#,
        )
        .bind(recipient.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(language.flatten())
    }
}

#[derive(Clone)]
pub struct PostgresScheduledBroadcastRepository {
    pool: PgPool,
}

impl PostgresScheduledBroadcastRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl ScheduledBroadcastRepository for PostgresScheduledBroadcastRepository {
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<ScheduledBroadcast>> {
        let rows = sqlx::query_as::<_, ScheduledNotificationRecord>(
            r#"
            SELECT id, message_type, message_text, photo_file_id, parse_mode,
                   interval_hours, enabled, last_sent_at, next_run_at
            FROM scheduled_notifications
            WHERE enabled = TRUE AND next_run_at <= $1
            ORDER BY next_run_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(into_broadcasts(rows))
    }

    async fn mark_sent(
        &self,
        id: i64,
        last_sent_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_notifications
            SET last_sent_at = $2, next_run_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(last_sent_at)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("scheduled notification {id} not found");
        }
        Ok(())
    }
}

/// Rows that fail to convert are skipped so the rest still go out.
fn into_broadcasts(rows: Vec<ScheduledNotificationRecord>) -> Vec<ScheduledBroadcast> {
    rows.into_iter()
        .filter_map(|record| {
            let scheduled_id = record.id;
            match ScheduledBroadcast::try_from(record) {
                Ok(item) => Some(item),
                Err(err) => {
                    tracing::warn!(
                        scheduled_id,
                        error = %err,
                        "Skipping unreadable scheduled notification"
                    );
                    None
                }
            }
        })
        .collect()
}

#[derive(FromRow)]
struct ScheduledNotificationRecord {
    id: i64,
    message_type: String,
    message_text: Option<String>,
    photo_file_id: Option<String>,
    parse_mode: Option<String>,
    interval_hours: i32,
    enabled: bool,
    last_sent_at: Option<DateTime<Utc>>,
    next_run_at: DateTime<Utc>,
}

impl TryFrom<ScheduledNotificationRecord> for ScheduledBroadcast {
    type Error = anyhow::Error;

    fn try_from(value: ScheduledNotificationRecord) -> Result<Self, Self::Error> {
        let kind = BroadcastKind::from_str(&value.message_type)
            .ok_or_else(|| anyhow::anyhow!("unknown message type {}", value.message_type))?;
        let render_mode = match value.parse_mode.as_deref().map(str::trim) {
            None | Some("") => RenderMode::Markdown,
            Some(mode) => RenderMode::from_str(mode)
                .ok_or_else(|| anyhow::anyhow!("unknown parse mode {mode}"))?,
        };
        let interval_hours = u32::try_from(value.interval_hours)
            .map_err(|_| anyhow::anyhow!("negative interval {}", value.interval_hours))?;

        Ok(Self {
            id: value.id,
            kind,
            body: value.message_text.unwrap_or_default(),
            media_ref: value.photo_file_id,
            render_mode,
            interval_hours,
            enabled: value.enabled,
            last_sent_at: value.last_sent_at,
            next_run_at: value.next_run_at,
        })
    }
}
