use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tracing::{error, info};

use ajopool_engine::CycleEngine;
use ajopool_pgstore::{PgLedger, PgStore};
use ajopool_platform::{RedisBus, RedisNotifier, ServiceConfig, connect_database};

const TICK_REQUEST_CHANNEL: &str = "cycles.tick.request";
const TICK_COMPLETED_CHANNEL: &str = "cycles.tick.completed";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ajopool_scheduler=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let pool = connect_database(&config).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let ledger = Arc::new(PgLedger::new(pool));
    let notifier = Arc::new(RedisNotifier::new(redis.clone()));
    let engine = CycleEngine::new(store, ledger, notifier);

    let mut interval = tokio::time::interval(Duration::from_secs(config.tick_interval_secs));

    let mut pubsub = redis.subscribe(TICK_REQUEST_CHANNEL).await?;
    let mut messages = pubsub.on_message();

    info!(
        tick_interval_secs = config.tick_interval_secs,
        "scheduler running, listening on {}", TICK_REQUEST_CHANNEL
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_tick(&engine, &redis).await;
            }
            msg = messages.next() => {
                // A message on the request channel forces an immediate sweep,
                // regardless of payload.
                msg.context("tick request stream ended unexpectedly")?;
                run_tick(&engine, &redis).await;
            }
        }
    }
}

async fn run_tick(engine: &CycleEngine, redis: &RedisBus) {
    match engine.tick().await {
        Ok(summary) => {
            info!(
                groups_processed = summary.groups_processed,
                cycles_settled = summary.cycles_settled,
                cycles_opened = summary.cycles_opened,
                payments_marked_missed = summary.payments_marked_missed,
                group_errors = summary.errors.len(),
                "tick completed"
            );
            for group_error in &summary.errors {
                error!("group failed during tick: {group_error}");
            }
            if let Err(err) = redis.publish_json(TICK_COMPLETED_CHANNEL, &summary).await {
                error!("failed to publish tick summary: {err:#}");
            }
        }
        Err(err) => error!("tick failed: {err:#}"),
    }
}
