// src/notify/webhook.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{DeliveryError, NotificationSink, SubscriberRef};
use crate::model::ChangeEvent;

/// POSTs the structured event as JSON to the subscriber's webhook URL.
/// Transient failures get a couple of retries with a short backoff; the
/// dispatcher treats anything beyond that as a per-subscriber failure.
#[derive(Clone)]
pub struct WebhookSink {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookSink {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
            max_retries: 3,
        }
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(
        &self,
        subscriber: &SubscriberRef,
        event: &ChangeEvent,
    ) -> Result<(), DeliveryError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&subscriber.0)
                .timeout(self.timeout)
                .json(event)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(DeliveryError(format!("webhook HTTP error: {e}")));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(DeliveryError(format!("webhook request failed: {e}")));
                }
            }
        }
    }
}
