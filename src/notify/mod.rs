// src/notify/mod.rs
pub mod webhook;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ChangeEvent;

/// Opaque subscriber handle. The sink decides what the inner string means
/// (webhook URL, chat conversation id, ...); this core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberRef(pub String);

/// Who wants to hear about a given survey. Queried once per event; must be
/// cheap to call. This core never mutates subscriptions.
pub trait SubscriptionLookup: Send + Sync {
    fn subscribers(&self, survey_id: &str) -> Vec<SubscriberRef>;
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// Delivers one structured event to one subscriber. Message rendering is the
/// sink's concern; the core hands over `ChangeEvent` data, not text.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        subscriber: &SubscriberRef,
        event: &ChangeEvent,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Best-effort fan-out: one `notify` per (event, subscriber) pair, failures
/// counted rather than raised. Events for the same survey reach a given
/// subscriber in detector order because events are walked in sequence.
pub async fn dispatch(
    events: &[ChangeEvent],
    subscriptions: &dyn SubscriptionLookup,
    sink: &dyn NotificationSink,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for event in events {
        for subscriber in subscriptions.subscribers(&event.survey_id) {
            match sink.notify(&subscriber, event).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        subscriber = %subscriber.0,
                        survey = %event.survey_id,
                        error = %e,
                        "notification delivery failed"
                    );
                    report.failed += 1;
                }
            }
        }
    }

    counter!("notify_delivered_total").increment(report.delivered as u64);
    counter!("notify_failed_total").increment(report.failed as u64);
    report
}

/// Glue lookup for deployments where every subscriber watches every survey:
/// a comma-separated `SUBSCRIBER_WEBHOOKS` list from the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticSubscriptions {
    all: Vec<SubscriberRef>,
}

impl StaticSubscriptions {
    pub fn new(subscribers: Vec<SubscriberRef>) -> Self {
        Self { all: subscribers }
    }

    pub fn from_env() -> Self {
        let all = std::env::var("SUBSCRIBER_WEBHOOKS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| SubscriberRef(s.to_string()))
            .collect();
        Self { all }
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

impl SubscriptionLookup for StaticSubscriptions {
    fn subscribers(&self, _survey_id: &str) -> Vec<SubscriberRef> {
        self.all.clone()
    }
}
