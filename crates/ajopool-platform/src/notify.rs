use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use ajopool_core::storage::Notifier;

use crate::contracts::NotificationEvent;
use crate::redis_bus::RedisBus;

pub const NOTIFICATIONS_CHANNEL: &str = "notifications.outbound";

/// Publishes notification events on the redis bus for the delivery workers.
/// Best-effort: a failed publish is logged and swallowed so a notification
/// outage never blocks or reverses a financial operation.
#[derive(Clone)]
pub struct RedisNotifier {
    bus: RedisBus,
}

impl RedisNotifier {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, user_id: Uuid, template: &str, data: serde_json::Value) {
        let event = NotificationEvent {
            user_id,
            template: template.to_string(),
            data,
            sent_at: Utc::now(),
        };
        if let Err(err) = self.bus.publish_json(NOTIFICATIONS_CHANNEL, &event).await {
            warn!(user_id = %user_id, template, "failed to publish notification: {err:#}");
        }
    }
}
