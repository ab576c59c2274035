use std::sync::Arc;
use std::time::Duration;

use futures_util::{pin_mut, StreamExt};
use tokio::sync::watch;
use tracing::{error, info, warn};

use truffle_core::types::ChatChannel;
use truffle_slack::mentions::replace_user_mentions;

use crate::app::AppState;

/// Interval-driven ingestion loop. A `try_lock` guard keeps runs from
/// overlapping when one run outlasts the interval.
pub async fn run(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.config.ingestion.interval_secs);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(period_secs = period.as_secs(), "ingestion scheduler started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_ingestion(&state).await {
                    error!("ingestion run failed: {e}");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("ingestion scheduler shutting down");
                    break;
                }
            }
        }
    }
}

/// One full ingestion pass: window selection, channel/user sync,
/// per-channel enqueue, first-run drain + aggregation.
pub async fn run_ingestion(state: &AppState) -> anyhow::Result<()> {
    let Ok(_guard) = state.ingest_lock.try_lock() else {
        warn!("ingestion already running, skipping this trigger");
        return Ok(());
    };

    let first_run = state.store.is_database_empty()?;
    let since_hours = if first_run {
        state.config.ingestion.first_run_hours
    } else {
        state.config.ingestion.periodic_hours
    };
    info!(first_run, since_hours, "starting ingestion run");

    let channels = state.slack.list_public_channels(true).await?;
    let users = Arc::new(state.slack.list_users(true, true).await?);
    state.store.upsert_users(&users)?;
    info!(channels = channels.len(), users = users.len(), "workspace synced");

    let mut enqueued = 0usize;
    for channel in &channels {
        match enqueue_channel(state, channel, since_hours, &users).await {
            Ok(count) => enqueued += count,
            // One bad channel never blocks the rest of the run
            Err(e) => error!(channel = %channel.name, "error enqueuing channel: {e}"),
        }
    }
    info!(enqueued, "ingestion enqueue complete");

    if first_run && enqueued > 0 {
        wait_for_drain(state).await;
        let scores = state.store.aggregate_all_scores()?;
        info!(scores, "first-run aggregation complete");
    }

    Ok(())
}

/// Walk one channel's recent history and enqueue every message, with
/// mentions rewritten. Each channel starts a fresh rate-limit batch.
async fn enqueue_channel(
    state: &AppState,
    channel: &ChatChannel,
    since_hours: u64,
    users: &Arc<std::collections::HashMap<String, truffle_core::types::ChatUser>>,
) -> anyhow::Result<usize> {
    state.slack.reset_batch_counter();

    let mut count = 0usize;
    let stream = state.slack.recent_messages(&channel.id, since_hours);
    pin_mut!(stream);

    while let Some(message) = stream.next().await {
        let mut message = message?;
        if !message.text.is_empty() {
            message.text = replace_user_mentions(&message.text, users);
        }
        state
            .queue
            .enqueue(message, channel.clone(), users.clone());
        count += 1;
    }

    info!(channel = %channel.name, count, "channel enqueued");
    Ok(count)
}

/// Poll queue stats until the backlog drains or the timeout elapses.
async fn wait_for_drain(state: &AppState) {
    let poll = Duration::from_secs(state.config.ingestion.drain_poll_secs);
    let deadline =
        tokio::time::Instant::now() + Duration::from_secs(state.config.ingestion.drain_timeout_secs);

    info!("first run: waiting for queue to drain before aggregating");
    loop {
        let stats = state.queue.stats();
        if stats.is_drained() {
            info!("queue drained");
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(pending = stats.pending, processing = stats.processing,
                "drain wait timed out, aggregating anyway");
            return;
        }
        tokio::time::sleep(poll).await;
    }
}

/// Single-channel import triggered over HTTP (e.g. after the bot joins a
/// channel). Waits out one batch window first so join bursts stay inside
/// the rate budget.
pub async fn import_channel(state: &AppState, channel_id: &str) -> anyhow::Result<usize> {
    tokio::time::sleep(Duration::from_secs(state.config.slack.batch_wait_seconds)).await;

    let _guard = state.ingest_lock.lock().await;

    let channels = state.slack.list_public_channels(true).await?;
    let channel = channels
        .into_iter()
        .find(|c| c.id == channel_id)
        .unwrap_or_else(|| ChatChannel {
            id: channel_id.to_string(),
            name: channel_id.to_string(),
        });

    let users = Arc::new(state.slack.list_users(true, true).await?);
    state.store.upsert_users(&users)?;

    let since_hours = state.config.ingestion.first_run_hours;
    let count = enqueue_channel(state, &channel, since_hours, &users).await?;
    info!(channel = %channel.name, count, "channel import complete");
    Ok(count)
}
