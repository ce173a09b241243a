mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use common::{RecordingClient, ids};
use notifications::{
    application::{
        handlers::notification_scheduler::{NotificationScheduler, SchedulerConfig},
        services::broadcaster::Broadcaster,
    },
    domain::{
        models::{BroadcastKind, RecipientId, RenderMode, ScheduledBroadcast},
        repositories::{RecipientDirectory, ScheduledBroadcastRepository},
    },
    infrastructure::repositories::in_memory::{
        InMemoryRecipientDirectory, InMemoryScheduledBroadcastRepository,
    },
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0).unwrap()
}

fn scheduled(id: i64, next_run_at: DateTime<Utc>) -> ScheduledBroadcast {
    ScheduledBroadcast {
        id,
        kind: BroadcastKind::Text,
        body: format!("digest {id}"),
        media_ref: None,
        render_mode: RenderMode::Markdown,
        interval_hours: 24,
        enabled: true,
        last_sent_at: None,
        next_run_at,
    }
}

struct Fixture {
    scheduler: Arc<NotificationScheduler>,
    store: Arc<InMemoryScheduledBroadcastRepository>,
    directory: Arc<InMemoryRecipientDirectory>,
    client: Arc<RecordingClient>,
}

fn fixture(recipients: std::ops::RangeInclusive<i64>, client: RecordingClient) -> Fixture {
    let store = Arc::new(InMemoryScheduledBroadcastRepository::new());
    let directory = Arc::new(InMemoryRecipientDirectory::with_recipients(ids(recipients)));
    let client = Arc::new(client);
    let scheduler = NotificationScheduler::new(
        store.clone(),
        directory.clone(),
        client.clone(),
        Broadcaster::default(),
        SchedulerConfig::default(),
    );
    Fixture {
        scheduler,
        store,
        directory,
        client,
    }
}

#[tokio::test(start_paused = true)]
async fn only_enabled_due_items_are_sent() {
    let f = fixture(1..=2, RecordingClient::new());
    let now = now();
    f.store.insert(scheduled(1, now - chrono::Duration::minutes(5))).await;
    f.store.insert(scheduled(2, now + chrono::Duration::minutes(5))).await;
    f.store
        .insert(ScheduledBroadcast {
            enabled: false,
            ..scheduled(3, now - chrono::Duration::days(3))
        })
        .await;

    assert_eq!(f.scheduler.run_tick(now).await.unwrap(), 1);
    let bodies: Vec<String> = f.client.delivered().into_iter().map(|(_, m)| m.text).collect();
    assert_eq!(bodies, vec!["digest 1", "digest 1"]);

    // Rescheduled, so the same instant selects nothing.
    assert_eq!(f.scheduler.run_tick(now).await.unwrap(), 0);
    assert_eq!(f.client.delivered().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn sent_item_is_rescheduled_by_its_interval() {
    let f = fixture(1..=1, RecordingClient::new());
    let now = now();
    f.store.insert(scheduled(1, now - chrono::Duration::hours(2))).await;

    f.scheduler.run_tick(now).await.unwrap();

    let item = f.store.get(1).await.unwrap();
    assert_eq!(item.last_sent_at, Some(now));
    assert_eq!(item.next_run_at, now + chrono::Duration::hours(24));
}

#[tokio::test(start_paused = true)]
async fn item_with_no_subscribers_is_still_rescheduled() {
    let f = fixture(1..=1, RecordingClient::new());
    f.directory.remove(RecipientId(1)).await.unwrap();
    let now = now();
    f.store.insert(scheduled(4, now)).await;

    assert_eq!(f.scheduler.run_tick(now).await.unwrap(), 1);
    assert!(f.client.attempts().is_empty());
    assert_eq!(f.store.get(4).await.unwrap().last_sent_at, Some(now));
}

#[tokio::test(start_paused = true)]
async fn media_item_is_sent_as_photo() {
    let f = fixture(1..=1, RecordingClient::new());
    let now = now();
    f.store
        .insert(ScheduledBroadcast {
            kind: BroadcastKind::Media,
            media_ref: Some("AgADBAAD".into()),
            ..scheduled(5, now)
        })
        .await;

    f.scheduler.run_tick(now).await.unwrap();
    let messages = f.client.delivered_to(1);
    assert_eq!(messages[0].media_ref.as_deref(), Some("AgADBAAD"));
    assert_eq!(messages[0].text, "digest 5");
}

#[tokio::test(start_paused = true)]
async fn blocked_subscribers_are_removed_after_dispatch() {
    let client = RecordingClient::new().failing(2, "Forbidden: bot was blocked by the user");
    let f = fixture(1..=3, client);
    let now = now();
    f.store.insert(scheduled(1, now)).await;

    f.scheduler.run_tick(now).await.unwrap();

    assert_eq!(
        f.directory.all_recipients().await.unwrap(),
        vec![RecipientId(1), RecipientId(3)]
    );
}

/// Fails `mark_sent` for one id; everything else goes to the inner store.
struct FlakyStore {
    inner: InMemoryScheduledBroadcastRepository,
    broken_id: i64,
}

#[async_trait]
impl ScheduledBroadcastRepository for FlakyStore {
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<ScheduledBroadcast>> {
        self.inner.list_due(now, limit).await
    }

    async fn mark_sent(
        &self,
        id: i64,
        last_sent_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if id == self.broken_id {
            anyhow::bail!("deadlock detected");
        }
        self.inner.mark_sent(id, last_sent_at, next_run_at).await
    }
}

#[tokio::test(start_paused = true)]
async fn one_failing_item_does_not_stop_the_rest() {
    let now = now();
    let inner = InMemoryScheduledBroadcastRepository::new();
    inner.insert(scheduled(1, now - chrono::Duration::hours(1))).await;
    inner.insert(scheduled(2, now)).await;
    let store = Arc::new(FlakyStore {
        inner,
        broken_id: 1,
    });
    let client = Arc::new(RecordingClient::new());

    let scheduler = NotificationScheduler::new(
        store.clone(),
        Arc::new(InMemoryRecipientDirectory::with_recipients(ids(1..=1))),
        client.clone(),
        Broadcaster::default(),
        SchedulerConfig::default(),
    );

    assert_eq!(scheduler.run_tick(now).await.unwrap(), 1);
    assert_eq!(client.delivered().len(), 2);
    assert_eq!(store.inner.get(2).await.unwrap().last_sent_at, Some(now));
    assert_eq!(store.inner.get(1).await.unwrap().last_sent_at, None);
}

/// Counts `list_due` calls and fails every one of them.
#[derive(Default)]
struct UnreachableStore {
    calls: AtomicUsize,
}

#[async_trait]
impl ScheduledBroadcastRepository for UnreachableStore {
    async fn list_due(
        &self,
        _now: DateTime<Utc>,
        _limit: u32,
    ) -> anyhow::Result<Vec<ScheduledBroadcast>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("connection refused")
    }

    async fn mark_sent(
        &self,
        _id: i64,
        _last_sent_at: DateTime<Utc>,
        _next_run_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn loop_backs_off_on_store_errors_and_stops_cleanly() {
    let store = Arc::new(UnreachableStore::default());
    let scheduler = NotificationScheduler::new(
        store.clone(),
        Arc::new(InMemoryRecipientDirectory::new()),
        Arc::new(RecordingClient::new()),
        Broadcaster::default(),
        SchedulerConfig::default(),
    );

    scheduler.start().await;
    tokio::time::sleep(Duration::from_secs(12)).await;
    // Ticks at 0s, 5s and 10s: the error backoff, not the 60s interval.
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);

    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn start_twice_runs_one_loop() {
    let store = Arc::new(UnreachableStore::default());
    let scheduler = NotificationScheduler::new(
        store.clone(),
        Arc::new(InMemoryRecipientDirectory::new()),
        Arc::new(RecordingClient::new()),
        Broadcaster::default(),
        SchedulerConfig::default(),
    );

    scheduler.start().await;
    scheduler.start().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);

    scheduler.stop().await;
    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
}
